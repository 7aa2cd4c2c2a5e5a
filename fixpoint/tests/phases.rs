//! Multi-phase pipelines: each phase declares the kinds it derives and
//! consumes, later phases build on the finalized results of earlier ones, and
//! (with `debug` enabled) queries outside the declarations are rejected.

use std::sync::Arc;

use fixpoint::{
    EpState, PropertyKindRegistry, PropertyStore, PropertyValue, StoreConfig, StoreError,
};
use fixpoint_fixtures::{
    NodeGraph, ReachableNodes, ReachableNodesCount, node, reachable_nodes_analysis,
    reachable_nodes_count_analysis,
};
use pretty_assertions::assert_eq;

#[test]
fn a_second_phase_consumes_the_first_phases_results() {
    let graph = Arc::new(
        NodeGraph::new()
            .with_edge("a", "b")
            .with_edge("b", "c")
            .with_edge("c", "a")
            .with_edge("a", "d"),
    );
    let registry = Arc::new(PropertyKindRegistry::new());
    let nodes = registry
        .register_lattice::<ReachableNodes, _>("ReachableNodes", |_| ReachableNodes::All)
        .unwrap();
    let counts = registry
        .register_lattice::<ReachableNodesCount, _>("ReachableNodesCount", |_| {
            ReachableNodesCount::TooMany
        })
        .unwrap();
    let mut config = StoreConfig::new();
    config.set_debug(true);
    let store = PropertyStore::with_config(registry, config);

    // Phase 1 derives the reachable sets; the count kind is out of bounds.
    store.setup_phase([nodes], []);
    store.register_lazy(nodes, reachable_nodes_analysis(graph.clone(), nodes)).unwrap();
    let err = store.apply(&node("a"), counts).unwrap_err();
    assert!(matches!(err, StoreError::UnknownKind { .. }));
    for entity in graph.nodes() {
        store.force(&entity, nodes).unwrap();
    }
    store.wait_on_phase_completion().unwrap();
    assert_eq!(
        store.read(&node("a"), nodes).state,
        EpState::Final(PropertyValue::new(ReachableNodes::of(["a", "b", "c", "d"]))),
    );

    // Phase 2 derives counts from the finalized sets.
    store.setup_phase([counts], [nodes]);
    store.register_lazy(counts, reachable_nodes_count_analysis(nodes, counts)).unwrap();
    for name in ["a", "b", "c", "d"] {
        store.force(&node(name), counts).unwrap();
    }
    store.wait_on_phase_completion().unwrap();
    let expect = |name: &str, count: ReachableNodesCount| {
        assert_eq!(
            store.read(&node(name), counts).state,
            EpState::Final(PropertyValue::new(count)),
            "count of `{name}`",
        );
    };
    expect("a", ReachableNodesCount::Count(4));
    expect("b", ReachableNodesCount::Count(4));
    expect("c", ReachableNodesCount::Count(4));
    expect("d", ReachableNodesCount::Count(0));
}

#[test]
fn lazy_registrations_are_per_phase() {
    let registry = Arc::new(PropertyKindRegistry::new());
    let nodes = registry
        .register_lattice::<ReachableNodes, _>("ReachableNodes", |_| ReachableNodes::All)
        .unwrap();
    let graph = Arc::new(NodeGraph::new().with_edge("a", "b"));
    let store = PropertyStore::new(registry);

    store.setup_phase([nodes], []);
    store.register_lazy(nodes, reachable_nodes_analysis(graph.clone(), nodes)).unwrap();
    let err = store.register_lazy(nodes, reachable_nodes_analysis(graph.clone(), nodes));
    assert!(matches!(err, Err(StoreError::DuplicateLazy { .. })));
    store.wait_on_phase_completion().unwrap();

    // A new phase starts with a clean registration slate.
    store.setup_phase([nodes], []);
    store.register_lazy(nodes, reachable_nodes_analysis(graph, nodes)).unwrap();
}
