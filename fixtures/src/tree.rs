use std::sync::Arc;

use fixpoint::{
    AnalysisFn, ComputationResult, Entity, FinalUpdate, Lattice, PropertyKind, PropertyValue,
    analysis_fn,
};
use rustc_hash::FxHashMap;

/// The depth of a node below the scheduled root.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TreeLevel(pub u32);

impl Lattice for TreeLevel {
    fn bottom() -> Self {
        TreeLevel(u32::MAX)
    }

    fn top() -> Self {
        TreeLevel(0)
    }

    fn meet(&self, other: &Self) -> Self {
        TreeLevel(core::cmp::max(self.0, other.0))
    }
}

/// A rooted tree described by parent → children edges.
#[derive(Default)]
pub struct Tree {
    children: FxHashMap<String, Vec<String>>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_child(mut self, parent: &str, child: &str) -> Self {
        self.children.entry(parent.to_string()).or_default().push(child.to_string());
        self
    }

    fn children(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Finalizes the node at `level` and requests the same computation, one level
/// deeper, for each child — the incremental-result shape: no dependencies,
/// just follow-on work.
pub fn tree_level_analysis(tree: Arc<Tree>, kind: PropertyKind, level: u32) -> AnalysisFn {
    analysis_fn(move |_store, entity| {
        let name = entity.downcast_ref::<String>().expect("tree entities are node names");
        let pending: Vec<(AnalysisFn, Entity)> = tree
            .children(name)
            .iter()
            .map(|child| {
                (tree_level_analysis(tree.clone(), kind, level + 1), Entity::new(child.clone()))
            })
            .collect();
        let result = FinalUpdate {
            entity: entity.clone(),
            kind,
            value: PropertyValue::new(TreeLevel(level)),
        };
        Ok(if pending.is_empty() {
            ComputationResult::Final(result)
        } else {
            ComputationResult::incremental(result, pending)
        })
    })
}
