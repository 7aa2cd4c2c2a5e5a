use std::sync::Arc;

use fixpoint::{Entity, EpState, PropertyKind, PropertyKindRegistry, PropertyStore, PropertyValue};
use fixpoint_fixtures::{CallGraph, Purity, purity_analysis};
use pretty_assertions::assert_eq;

fn purity_kind(registry: &PropertyKindRegistry) -> PropertyKind {
    registry.register_lattice::<Purity, _>("Purity", |_| Purity::Impure).unwrap()
}

fn method(name: &str) -> Entity {
    Entity::new(name.to_string())
}

fn assert_purity(store: &PropertyStore, kind: PropertyKind, name: &str, expected: Purity) {
    assert_eq!(
        store.read(&method(name), kind).state,
        EpState::Final(PropertyValue::new(expected)),
        "purity of `{name}`",
    );
}

fn run_ring(n: usize) -> (PropertyStore, PropertyKind) {
    let graph = Arc::new(CallGraph::ring(n));
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = purity_kind(&registry);
    let store = PropertyStore::new(registry);
    store.register_lazy(kind, purity_analysis(graph, kind)).unwrap();
    store.force(&method("m0"), kind).unwrap();
    store.wait_on_phase_completion().unwrap();
    (store, kind)
}

#[test]
fn a_self_call_resolves_to_pure() {
    let (store, kind) = run_ring(1);
    assert_purity(&store, kind, "m0", Purity::Pure);
}

#[test]
fn a_small_ring_resolves_to_pure() {
    let (store, kind) = run_ring(5);
    for i in 0..5 {
        assert_purity(&store, kind, &format!("m{i}"), Purity::Pure);
    }
}

#[test]
fn a_huge_ring_resolves_to_pure() {
    let (store, kind) = run_ring(50_000);
    assert_purity(&store, kind, "m0", Purity::Pure);
    assert_purity(&store, kind, "m25000", Purity::Pure);
    assert_purity(&store, kind, "m49999", Purity::Pure);
    assert_eq!(store.statistics().cells_collapsed, 50_000);
}

#[test]
fn an_impure_member_poisons_the_ring() {
    let graph = Arc::new(CallGraph::ring(8).mark_impure("m5"));
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = purity_kind(&registry);
    let store = PropertyStore::new(registry);
    store.register_lazy(kind, purity_analysis(graph.clone(), kind)).unwrap();
    for entity in graph.methods() {
        store.force(&entity, kind).unwrap();
    }
    store.wait_on_phase_completion().unwrap();
    for i in 0..8 {
        assert_purity(&store, kind, &format!("m{i}"), Purity::Impure);
    }
    // Nothing was left for cycle collapse; impurity propagated directly.
    assert_eq!(store.statistics().cells_collapsed, 0);
}

#[test]
fn chained_rings_collapse_iteratively() {
    // Ring a0→a1→a2→a0 with a bridge a1→b0 into ring b0→b1→b0. The inner ring
    // must collapse before the outer one can.
    let graph = Arc::new(
        CallGraph::new()
            .with_call("a0", "a1")
            .with_call("a1", "a2")
            .with_call("a2", "a0")
            .with_call("a1", "b0")
            .with_call("b0", "b1")
            .with_call("b1", "b0"),
    );
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = purity_kind(&registry);
    let store = PropertyStore::new(registry);
    store.register_lazy(kind, purity_analysis(graph, kind)).unwrap();
    store.force(&method("a0"), kind).unwrap();
    store.wait_on_phase_completion().unwrap();
    for name in ["a0", "a1", "a2", "b0", "b1"] {
        assert_purity(&store, kind, name, Purity::Pure);
    }
    assert_eq!(store.statistics().cells_collapsed, 5);
}

#[test]
fn an_impure_inner_ring_poisons_the_outer_ring() {
    let graph = Arc::new(
        CallGraph::new()
            .with_call("a0", "a1")
            .with_call("a1", "a0")
            .with_call("a1", "b0")
            .with_call("b0", "b1")
            .with_call("b1", "b0")
            .mark_impure("b1"),
    );
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = purity_kind(&registry);
    let store = PropertyStore::new(registry);
    store.register_lazy(kind, purity_analysis(graph, kind)).unwrap();
    store.force(&method("a0"), kind).unwrap();
    store.wait_on_phase_completion().unwrap();
    for name in ["a0", "a1", "b0", "b1"] {
        assert_purity(&store, kind, name, Purity::Impure);
    }
}
