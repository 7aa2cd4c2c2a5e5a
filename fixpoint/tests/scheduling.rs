//! The configured dispatch policy (eager head-of-queue continuations, delayed
//! final/non-final notification lanes, batched depender notification) must not
//! change the fixed point that is reached.

use std::sync::Arc;

use fixpoint::{
    DependeeUpdateHandling, Entity, EpState, PropertyKindRegistry, PropertyStore, PropertyValue,
    StoreConfig,
};
use fixpoint_fixtures::{CallGraph, Purity, purity_analysis};
use pretty_assertions::assert_eq;

fn run_ring_with(config: StoreConfig) -> (PropertyStore, fixpoint::PropertyKind) {
    let graph = Arc::new(CallGraph::ring(12));
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = registry.register_lattice::<Purity, _>("Purity", |_| Purity::Impure).unwrap();
    let store = PropertyStore::with_config(registry, config);
    store.register_lazy(kind, purity_analysis(graph.clone(), kind)).unwrap();
    for entity in graph.methods() {
        store.force(&entity, kind).unwrap();
    }
    store.wait_on_phase_completion().unwrap();
    (store, kind)
}

fn assert_all_pure(store: &PropertyStore, kind: fixpoint::PropertyKind) {
    for i in 0..12 {
        assert_eq!(
            store.read(&Entity::new(format!("m{i}")), kind).state,
            EpState::Final(PropertyValue::new(Purity::Pure)),
            "purity of m{i}",
        );
    }
}

#[test]
fn eager_dispatch_reaches_the_fixed_point() {
    let mut config = StoreConfig::new();
    config.set_dependee_update_handling(DependeeUpdateHandling::Eager);
    let (store, kind) = run_ring_with(config);
    assert_all_pure(&store, kind);
}

#[test]
fn delayed_final_notifications_reach_the_same_fixed_point() {
    let mut config = StoreConfig::new();
    config.set_dependee_update_handling(DependeeUpdateHandling::Lazy {
        delay_final: true,
        delay_non_final: false,
    });
    let (store, kind) = run_ring_with(config);
    assert_all_pure(&store, kind);
}

#[test]
fn delayed_non_final_notifications_reach_the_same_fixed_point() {
    let mut config = StoreConfig::new();
    config.set_dependee_update_handling(DependeeUpdateHandling::Lazy {
        delay_final: false,
        delay_non_final: true,
    });
    let (store, kind) = run_ring_with(config);
    assert_all_pure(&store, kind);
}

#[test]
fn delaying_both_notification_kinds_reaches_the_same_fixed_point() {
    let mut config = StoreConfig::new();
    config.set_dependee_update_handling(DependeeUpdateHandling::Lazy {
        delay_final: true,
        delay_non_final: true,
    });
    let (store, kind) = run_ring_with(config);
    assert_all_pure(&store, kind);
}

#[test]
fn batched_depender_notification_reaches_the_same_fixed_point() {
    let mut config = StoreConfig::new();
    config.set_delay_depender_notification(true);
    let (store, kind) = run_ring_with(config);
    assert_all_pure(&store, kind);
}
