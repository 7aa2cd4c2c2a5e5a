use std::sync::Arc;

use fixpoint::{EpState, PropertyKind, PropertyKindRegistry, PropertyStore, PropertyValue};
use fixpoint_fixtures::{
    NodeGraph, ReachableNodes, ReachableNodesCount, node, reachable_nodes_analysis,
    reachable_nodes_count_analysis,
};
use pretty_assertions::assert_eq;

/// The demo graph: `a→b→c`, `b→d→d`, `d→e→r→b`, `a→f→{h,i,j}`, `h↔j`, `i↔j`,
/// `a→g→h`, `a→h`.
fn demo_graph() -> Arc<NodeGraph> {
    Arc::new(
        NodeGraph::new()
            .with_edge("a", "b")
            .with_edge("b", "c")
            .with_edge("b", "d")
            .with_edge("d", "d")
            .with_edge("d", "e")
            .with_edge("e", "r")
            .with_edge("r", "b")
            .with_edges("a", ["f", "g", "h"])
            .with_edges("f", ["h", "i", "j"])
            .with_edge("h", "j")
            .with_edge("j", "h")
            .with_edge("i", "j")
            .with_edge("j", "i")
            .with_edge("g", "h"),
    )
}

fn nodes_kind(registry: &PropertyKindRegistry) -> PropertyKind {
    registry
        .register_lattice::<ReachableNodes, _>("ReachableNodes", |_| ReachableNodes::All)
        .unwrap()
}

fn count_kind(registry: &PropertyKindRegistry) -> PropertyKind {
    registry
        .register_lattice::<ReachableNodesCount, _>("ReachableNodesCount", |_| {
            ReachableNodesCount::TooMany
        })
        .unwrap()
}

fn assert_reachable(store: &PropertyStore, kind: PropertyKind, from: &str, expected: ReachableNodes) {
    assert_eq!(
        store.read(&node(from), kind).state,
        EpState::Final(PropertyValue::new(expected)),
        "reachable set of `{from}`",
    );
}

fn assert_demo_sets(store: &PropertyStore, kind: PropertyKind) {
    assert_reachable(
        store,
        kind,
        "a",
        ReachableNodes::of(["b", "c", "d", "e", "r", "f", "g", "h", "i", "j"]),
    );
    assert_reachable(store, kind, "b", ReachableNodes::of(["b", "c", "d", "e", "r"]));
    assert_reachable(store, kind, "c", ReachableNodes::of([]));
}

#[test]
fn lazy_reachability_reaches_the_fixed_point() {
    let graph = demo_graph();
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = nodes_kind(&registry);
    let store = PropertyStore::new(registry);
    store.register_lazy(kind, reachable_nodes_analysis(graph.clone(), kind)).unwrap();
    for entity in graph.nodes() {
        store.force(&entity, kind).unwrap();
    }
    store.wait_on_phase_completion().unwrap();
    assert_demo_sets(&store, kind);
}

#[test]
fn eager_reachability_reaches_the_same_fixed_point() {
    let graph = demo_graph();
    let registry = Arc::new(PropertyKindRegistry::new());
    let kind = nodes_kind(&registry);
    let store = PropertyStore::new(registry);
    store.schedule_eager(reachable_nodes_analysis(graph.clone(), kind), graph.nodes());
    store.wait_on_phase_completion().unwrap();
    assert_demo_sets(&store, kind);
}

#[test]
fn counts_follow_the_reachable_sets() {
    let graph = demo_graph();
    let registry = Arc::new(PropertyKindRegistry::new());
    let nodes = nodes_kind(&registry);
    let counts = count_kind(&registry);
    let store = PropertyStore::new(registry);
    store.register_lazy(nodes, reachable_nodes_analysis(graph.clone(), nodes)).unwrap();
    store.register_lazy(counts, reachable_nodes_count_analysis(nodes, counts)).unwrap();
    for name in ["a", "b", "c"] {
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
    expect("a", ReachableNodesCount::Count(10));
    expect("b", ReachableNodesCount::Count(5));
    expect("c", ReachableNodesCount::Count(0));
}

#[test]
fn counts_with_eagerly_scheduled_sets_match() {
    let graph = demo_graph();
    let registry = Arc::new(PropertyKindRegistry::new());
    let nodes = nodes_kind(&registry);
    let counts = count_kind(&registry);
    let store = PropertyStore::new(registry);
    store.schedule_eager(reachable_nodes_analysis(graph.clone(), nodes), graph.nodes());
    store.register_lazy(counts, reachable_nodes_count_analysis(nodes, counts)).unwrap();
    for name in ["a", "b"] {
        store.force(&node(name), counts).unwrap();
    }
    store.wait_on_phase_completion().unwrap();
    assert_eq!(
        store.read(&node("a"), counts).state,
        EpState::Final(PropertyValue::new(ReachableNodesCount::Count(10))),
    );
    assert_eq!(
        store.read(&node("b"), counts).state,
        EpState::Final(PropertyValue::new(ReachableNodesCount::Count(5))),
    );
}

#[test]
fn counts_cap_at_the_threshold() {
    // A linear chain longer than the cap.
    let mut graph = NodeGraph::new();
    for i in 0..70 {
        graph = graph.with_edge(&format!("n{i}"), &format!("n{}", i + 1));
    }
    let graph = Arc::new(graph);
    let registry = Arc::new(PropertyKindRegistry::new());
    let nodes = nodes_kind(&registry);
    let counts = count_kind(&registry);
    let store = PropertyStore::new(registry);
    store.register_lazy(nodes, reachable_nodes_analysis(graph.clone(), nodes)).unwrap();
    store.register_lazy(counts, reachable_nodes_count_analysis(nodes, counts)).unwrap();
    store.force(&node("n0"), counts).unwrap();
    store.force(&node("n40"), counts).unwrap();
    store.wait_on_phase_completion().unwrap();
    assert_eq!(
        store.read(&node("n0"), counts).state,
        EpState::Final(PropertyValue::new(ReachableNodesCount::TooMany)),
    );
    // 30 successors from n40 stays under the cap.
    assert_eq!(
        store.read(&node("n40"), counts).state,
        EpState::Final(PropertyValue::new(ReachableNodesCount::Count(30))),
    );
}
