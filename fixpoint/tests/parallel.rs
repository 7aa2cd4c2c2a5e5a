//! The parallel execution model must reach the same fixed points as the
//! sequential reference model.

use std::{num::NonZeroUsize, sync::Arc};

use fixpoint::{
    Entity, EpState, PropertyKindRegistry, PropertyStore, PropertyValue, StoreConfig,
};
use fixpoint_fixtures::{
    CallGraph, NodeGraph, Purity, ReachableNodes, node, purity_analysis,
    reachable_nodes_analysis,
};
use pretty_assertions::assert_eq;

fn parallel_store(registry: Arc<PropertyKindRegistry>, workers: usize) -> PropertyStore {
    let config = StoreConfig::parallel(NonZeroUsize::new(workers).unwrap());
    PropertyStore::with_config(registry, config)
}

#[test]
fn a_parallel_ring_resolves_to_pure() {
    let graph = Arc::new(CallGraph::ring(100));
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = registry.register_lattice::<Purity, _>("Purity", |_| Purity::Impure).unwrap();
    let store = parallel_store(registry, 4);
    store.register_lazy(kind, purity_analysis(graph.clone(), kind)).unwrap();
    for entity in graph.methods() {
        store.force(&entity, kind).unwrap();
    }
    store.wait_on_phase_completion().unwrap();
    for i in 0..100 {
        assert_eq!(
            store.read(&Entity::new(format!("m{i}")), kind).state,
            EpState::Final(PropertyValue::new(Purity::Pure)),
        );
    }
}

#[test]
fn a_parallel_impure_ring_converges() {
    let graph = Arc::new(CallGraph::ring(64).mark_impure("m31"));
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = registry.register_lattice::<Purity, _>("Purity", |_| Purity::Impure).unwrap();
    let store = parallel_store(registry, 8);
    store.register_lazy(kind, purity_analysis(graph.clone(), kind)).unwrap();
    for entity in graph.methods() {
        store.force(&entity, kind).unwrap();
    }
    store.wait_on_phase_completion().unwrap();
    for i in 0..64 {
        assert_eq!(
            store.read(&Entity::new(format!("m{i}")), kind).state,
            EpState::Final(PropertyValue::new(Purity::Impure)),
        );
    }
}

#[test]
fn parallel_reachability_matches_the_sequential_fixed_point() {
    let graph = Arc::new(
        NodeGraph::new()
            .with_edge("a", "b")
            .with_edge("b", "c")
            .with_edge("b", "d")
            .with_edge("d", "d")
            .with_edge("d", "e")
            .with_edge("e", "r")
            .with_edge("r", "b"),
    );
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = registry
        .register_lattice::<ReachableNodes, _>("ReachableNodes", |_| ReachableNodes::All)
        .unwrap();
    let store = parallel_store(registry, 4);
    store.register_lazy(kind, reachable_nodes_analysis(graph.clone(), kind)).unwrap();
    for entity in graph.nodes() {
        store.force(&entity, kind).unwrap();
    }
    store.wait_on_phase_completion().unwrap();
    assert_eq!(
        store.read(&node("a"), kind).state,
        EpState::Final(PropertyValue::new(ReachableNodes::of(["b", "c", "d", "e", "r"]))),
    );
    assert_eq!(
        store.read(&node("b"), kind).state,
        EpState::Final(PropertyValue::new(ReachableNodes::of(["b", "c", "d", "e", "r"]))),
    );
    assert_eq!(
        store.read(&node("c"), kind).state,
        EpState::Final(PropertyValue::new(ReachableNodes::of([]))),
    );
}
