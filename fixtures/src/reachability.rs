use std::{collections::BTreeSet, sync::Arc};

use fixpoint::{
    AnalysisFn, AnalysisOutcome, ComputationResult, Entity, EpState, Lattice, PropertyKind,
    PropertyStore, PropertyValue, analysis_fn,
};
use rustc_hash::FxHashMap;

/// Counts at or above this threshold collapse to
/// [ReachableNodesCount::TooMany].
pub const TOO_MANY_NODES_REACHABLE: usize = 64;

/// The set of nodes transitively reachable from a node.
///
/// The lattice is ordered by reverse inclusion: larger sets are lower, `meet`
/// is set union, and the top is the empty set. An analysis's upper bound is
/// therefore the set of nodes it has discovered so far, which only ever grows
/// as dependees report more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReachableNodes {
    /// The most pessimistic value: everything may be reachable.
    All,
    Nodes(BTreeSet<String>),
}

impl ReachableNodes {
    pub fn of<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        ReachableNodes::Nodes(names.into_iter().map(str::to_string).collect())
    }
}

impl Lattice for ReachableNodes {
    fn bottom() -> Self {
        ReachableNodes::All
    }

    fn top() -> Self {
        ReachableNodes::Nodes(BTreeSet::new())
    }

    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (ReachableNodes::All, _) | (_, ReachableNodes::All) => ReachableNodes::All,
            (ReachableNodes::Nodes(a), ReachableNodes::Nodes(b)) => {
                ReachableNodes::Nodes(a.union(b).cloned().collect())
            }
        }
    }
}

/// The size of the reachable set, capped at [TOO_MANY_NODES_REACHABLE].
///
/// Mirrors the ordering of [ReachableNodes]: higher counts are lower, with
/// `TooMany` as the bottom.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReachableNodesCount {
    TooMany,
    Count(usize),
}

impl ReachableNodesCount {
    pub fn of(len: usize) -> Self {
        if len >= TOO_MANY_NODES_REACHABLE {
            ReachableNodesCount::TooMany
        } else {
            ReachableNodesCount::Count(len)
        }
    }
}

impl Lattice for ReachableNodesCount {
    fn bottom() -> Self {
        ReachableNodesCount::TooMany
    }

    fn top() -> Self {
        ReachableNodesCount::Count(0)
    }

    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (ReachableNodesCount::TooMany, _) | (_, ReachableNodesCount::TooMany) => {
                ReachableNodesCount::TooMany
            }
            (ReachableNodesCount::Count(a), ReachableNodesCount::Count(b)) => {
                Self::of(core::cmp::max(*a, *b))
            }
        }
    }
}

/// A directed node graph for the reachability analyses.
#[derive(Default)]
pub struct NodeGraph {
    successors: FxHashMap<String, Vec<String>>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge(mut self, from: &str, to: &str) -> Self {
        self.successors.entry(from.to_string()).or_default().push(to.to_string());
        self
    }

    pub fn with_edges<'a>(mut self, from: &str, tos: impl IntoIterator<Item = &'a str>) -> Self {
        for to in tos {
            self = self.with_edge(from, to);
        }
        self
    }

    /// Every node mentioned as a source or target, deduplicated.
    pub fn nodes(&self) -> Vec<Entity> {
        let mut names: BTreeSet<&String> = self.successors.keys().collect();
        for targets in self.successors.values() {
            names.extend(targets);
        }
        names.into_iter().map(|name| Entity::new(name.clone())).collect()
    }

    fn successors(&self, name: &str) -> &[String] {
        self.successors.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Wrap a node name as an entity for the reachability analyses.
pub fn node(name: &str) -> Entity {
    Entity::new(name.to_string())
}

/// Derives [ReachableNodes]: the union of each successor and everything the
/// successor reaches. Self-loops and larger cycles suspend on themselves and
/// settle at their accumulated upper bound via cycle collapse.
pub fn reachable_nodes_analysis(graph: Arc<NodeGraph>, kind: PropertyKind) -> AnalysisFn {
    analysis_fn(move |store, entity| {
        compute_reachable(store, graph.clone(), kind, entity.clone())
    })
}

fn compute_reachable(
    store: &PropertyStore,
    graph: Arc<NodeGraph>,
    kind: PropertyKind,
    entity: Entity,
) -> AnalysisOutcome {
    let name = entity.downcast_ref::<String>().expect("graph entities are node names");
    let mut reached = BTreeSet::new();
    let mut pending = Vec::new();
    for succ in graph.successors(name) {
        reached.insert(succ.clone());
        let ep = store.apply(&node(succ), kind)?;
        let unresolved = match &ep.state {
            EpState::Final(v) => {
                merge(&mut reached, v);
                false
            }
            EpState::Interim { ub, .. } => {
                merge(&mut reached, ub);
                true
            }
            EpState::Epk => true,
        };
        if unresolved {
            pending.push(ep);
        }
    }
    if pending.is_empty() {
        return Ok(ComputationResult::finalized(
            entity,
            kind,
            PropertyValue::new(ReachableNodes::Nodes(reached)),
        ));
    }
    let e = entity.clone();
    Ok(ComputationResult::interim(
        entity,
        kind,
        PropertyValue::new(ReachableNodes::All),
        PropertyValue::new(ReachableNodes::Nodes(reached)),
        pending,
        Box::new(move |store, _ep| compute_reachable(store, graph, kind, e)),
    ))
}

fn merge(reached: &mut BTreeSet<String>, value: &PropertyValue) {
    if let Some(ReachableNodes::Nodes(nodes)) = value.downcast_ref::<ReachableNodes>() {
        reached.extend(nodes.iter().cloned());
    }
}

/// Derives [ReachableNodesCount] from [ReachableNodes] of the same entity.
///
/// Once the observed set reaches the cap, the count finalizes early: it can
/// only grow, so `TooMany` is already exact.
pub fn reachable_nodes_count_analysis(
    nodes_kind: PropertyKind,
    count_kind: PropertyKind,
) -> AnalysisFn {
    analysis_fn(move |store, entity| {
        compute_count(store, nodes_kind, count_kind, entity.clone())
    })
}

fn compute_count(
    store: &PropertyStore,
    nodes_kind: PropertyKind,
    count_kind: PropertyKind,
    entity: Entity,
) -> AnalysisOutcome {
    let ep = store.apply(&entity, nodes_kind)?;
    let observed = match &ep.state {
        EpState::Final(v) => {
            let count = match v.downcast_ref::<ReachableNodes>() {
                Some(ReachableNodes::Nodes(nodes)) => ReachableNodesCount::of(nodes.len()),
                _ => ReachableNodesCount::TooMany,
            };
            return Ok(ComputationResult::finalized(
                entity,
                count_kind,
                PropertyValue::new(count),
            ));
        }
        EpState::Interim { ub, .. } => match ub.downcast_ref::<ReachableNodes>() {
            Some(ReachableNodes::Nodes(nodes)) => nodes.len(),
            _ => 0,
        },
        EpState::Epk => 0,
    };
    if observed >= TOO_MANY_NODES_REACHABLE {
        return Ok(ComputationResult::finalized(
            entity,
            count_kind,
            PropertyValue::new(ReachableNodesCount::TooMany),
        ));
    }
    let e = entity.clone();
    Ok(ComputationResult::interim(
        entity,
        count_kind,
        PropertyValue::new(ReachableNodesCount::TooMany),
        PropertyValue::new(ReachableNodesCount::Count(observed)),
        [ep],
        Box::new(move |store, _ep| compute_count(store, nodes_kind, count_kind, e)),
    ))
}
