use std::sync::Arc;

use fixpoint::{
    AnalysisFn, AnalysisOutcome, ComputationResult, Entity, Lattice, PropertyKind, PropertyStore,
    PropertyValue, analysis_fn,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// The classic two-point purity lattice. `Pure` is the optimistic top;
/// discovering an impure callee drags the value down.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Purity {
    Impure,
    Pure,
}

impl Lattice for Purity {
    fn bottom() -> Self {
        Purity::Impure
    }

    fn top() -> Self {
        Purity::Pure
    }

    fn meet(&self, other: &Self) -> Self {
        core::cmp::min(*self, *other)
    }
}

/// A toy call graph: method names, their callees, and the set of methods that
/// are intrinsically impure.
#[derive(Default)]
pub struct CallGraph {
    calls: FxHashMap<String, Vec<String>>,
    impure: FxHashSet<String>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ring `m0 → m1 → … → m(n-1) → m0`; with `n == 1` the single method
    /// calls itself.
    pub fn ring(n: usize) -> Self {
        let mut graph = Self::new();
        for i in 0..n {
            let caller = format!("m{i}");
            let callee = format!("m{}", (i + 1) % n);
            graph = graph.with_call(&caller, &callee);
        }
        graph
    }

    pub fn with_call(mut self, caller: &str, callee: &str) -> Self {
        self.calls.entry(caller.to_string()).or_default().push(callee.to_string());
        self
    }

    pub fn mark_impure(mut self, name: &str) -> Self {
        self.impure.insert(name.to_string());
        self
    }

    pub fn methods(&self) -> impl Iterator<Item = Entity> + '_ {
        self.calls.keys().map(|name| Entity::new(name.clone()))
    }

    fn callees(&self, name: &str) -> &[String] {
        self.calls.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Derives [Purity]: a method is pure iff it is not intrinsically impure and
/// every callee is pure. Cyclic call graphs suspend on each other and are
/// resolved by cycle collapse at their optimistic upper bound.
pub fn purity_analysis(graph: Arc<CallGraph>, kind: PropertyKind) -> AnalysisFn {
    analysis_fn(move |store, entity| compute_purity(store, graph.clone(), kind, entity.clone()))
}

fn compute_purity(
    store: &PropertyStore,
    graph: Arc<CallGraph>,
    kind: PropertyKind,
    entity: Entity,
) -> AnalysisOutcome {
    let name = entity.downcast_ref::<String>().expect("purity entities are method names");
    if graph.impure.contains(name) {
        return Ok(ComputationResult::finalized(entity, kind, PropertyValue::new(Purity::Impure)));
    }
    let mut pending = Vec::new();
    for callee in graph.callees(name) {
        let ep = store.apply(&Entity::new(callee.clone()), kind)?;
        match ep.final_value().and_then(|v| v.downcast_ref::<Purity>()).copied() {
            Some(Purity::Impure) => {
                return Ok(ComputationResult::finalized(
                    entity,
                    kind,
                    PropertyValue::new(Purity::Impure),
                ));
            }
            Some(Purity::Pure) => {}
            None => pending.push(ep),
        }
    }
    if pending.is_empty() {
        return Ok(ComputationResult::finalized(entity, kind, PropertyValue::new(Purity::Pure)));
    }
    let e = entity.clone();
    Ok(ComputationResult::interim(
        entity,
        kind,
        PropertyValue::new(Purity::Impure),
        PropertyValue::new(Purity::Pure),
        pending,
        Box::new(move |store, _ep| compute_purity(store, graph, kind, e)),
    ))
}
