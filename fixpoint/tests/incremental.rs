use std::sync::Arc;

use fixpoint::{
    ComputationResult, Entity, EpState, FinalUpdate, PropertyKindRegistry, PropertyStore,
    PropertyValue, analysis_fn,
};
use fixpoint_fixtures::{Tree, TreeLevel, tree_level_analysis};
use pretty_assertions::assert_eq;

fn node(name: &str) -> Entity {
    Entity::new(name.to_string())
}

#[test]
fn incremental_results_walk_the_tree() {
    let tree = Arc::new(
        Tree::new()
            .with_child("root", "l")
            .with_child("root", "r")
            .with_child("l", "ll")
            .with_child("l", "lr")
            .with_child("ll", "lll"),
    );
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = registry
        .register_lattice::<TreeLevel, _>("TreeLevel", |_| TreeLevel(u32::MAX))
        .unwrap();
    let store = PropertyStore::new(registry);
    store.schedule_eager(tree_level_analysis(tree, kind, 0), [node("root")]);
    store.wait_on_phase_completion().unwrap();

    let expect = |name: &str, level: u32| {
        assert_eq!(
            store.read(&node(name), kind).state,
            EpState::Final(PropertyValue::new(TreeLevel(level))),
            "level of `{name}`",
        );
    };
    expect("root", 0);
    expect("l", 1);
    expect("r", 1);
    expect("ll", 2);
    expect("lr", 2);
    expect("lll", 3);
    assert_eq!(store.entities_with_kind(kind).len(), 6);
}

#[test]
fn a_deep_chain_descends_without_recursion() {
    let mut tree = Tree::new();
    for i in 0..500 {
        tree = tree.with_child(&format!("n{i}"), &format!("n{}", i + 1));
    }
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = registry
        .register_lattice::<TreeLevel, _>("TreeLevel", |_| TreeLevel(u32::MAX))
        .unwrap();
    let store = PropertyStore::new(registry);
    store.schedule_eager(tree_level_analysis(Arc::new(tree), kind, 0), [node("n0")]);
    store.wait_on_phase_completion().unwrap();
    assert_eq!(
        store.read(&node("n500"), kind).state,
        EpState::Final(PropertyValue::new(TreeLevel(500))),
    );
}

#[test]
fn multi_results_finalize_several_cells_at_once() {
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = registry
        .register_lattice::<TreeLevel, _>("TreeLevel", |_| TreeLevel(u32::MAX))
        .unwrap();
    let store = PropertyStore::new(registry);
    store.schedule_eager(
        analysis_fn(move |_, _| {
            Ok(ComputationResult::Multi(
                (0..4)
                    .map(|i| FinalUpdate {
                        entity: node(&format!("n{i}")),
                        kind,
                        value: PropertyValue::new(TreeLevel(i)),
                    })
                    .collect(),
            ))
        }),
        [node("driver")],
    );
    store.wait_on_phase_completion().unwrap();
    for i in 0..4 {
        assert_eq!(
            store.read(&node(&format!("n{i}")), kind).state,
            EpState::Final(PropertyValue::new(TreeLevel(i))),
        );
    }
}
