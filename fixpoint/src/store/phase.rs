use petgraph::{algo::tarjan_scc, prelude::DiGraphMap};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::stats::StoreStats;
use crate::{AnalysisFn, EpKey, EpState, FallbackReason, PropertyKind, PropertyValue, StoreError};

/// Per-phase bookkeeping: the declared kind sets and the analyses registered
/// for the current phase.
pub(crate) struct PhaseState {
    pub index: u32,
    pub derived: FxHashSet<PropertyKind>,
    pub consumed: FxHashSet<PropertyKind>,
    pub lazy: FxHashMap<PropertyKind, AnalysisFn>,
    pub triggered: FxHashMap<PropertyKind, Vec<AnalysisFn>>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self {
            index: 1,
            derived: FxHashSet::default(),
            consumed: FxHashSet::default(),
            lazy: FxHashMap::default(),
            triggered: FxHashMap::default(),
        }
    }
}

impl PhaseState {
    /// The kinds some analysis executed in this phase derives; determines the
    /// fallback reason for cells left without information.
    fn derives(&self, kind: PropertyKind) -> bool {
        self.derived.contains(&kind)
            || self.lazy.contains_key(&kind)
            || self.triggered.contains_key(&kind)
    }
}

/// A refinable cell captured at quiescence, for the cycle-resolution pass.
struct Refinable {
    key: EpKey,
    lb: PropertyValue,
    ub: PropertyValue,
    dependees: SmallVec<[EpKey; 4]>,
    /// The cell has a dependee that is not itself a refinable interim cell,
    /// so no component containing it can be collapsed yet.
    open: bool,
}

impl super::PropertyStore {
    /// Open a new phase declaring the kinds it derives and consumes.
    ///
    /// Lazy and triggered registrations belong to a phase and are cleared
    /// here; lazy trigger bookkeeping restarts, so a lazy computation may run
    /// again (at most once) per entity in the new phase.
    pub fn setup_phase(
        &self,
        derived: impl IntoIterator<Item = PropertyKind>,
        consumed: impl IntoIterator<Item = PropertyKind>,
    ) {
        let mut phase = self.phase.lock();
        phase.index += 1;
        phase.derived = derived.into_iter().collect();
        phase.consumed = consumed.into_iter().collect();
        phase.lazy.clear();
        phase.triggered.clear();
        log::debug!(
            target: "phase",
            "phase {} configured ({} derived, {} consumed)",
            phase.index,
            phase.derived.len(),
            phase.consumed.len(),
        );
    }

    /// Drive the store to phase completion.
    ///
    /// Loops over three stages until all of them quiesce: (1) drain the task
    /// queue, (2) collapse closed strongly-connected components of refinable
    /// cells to their upper bounds, (3) install fallbacks for queried cells
    /// that still hold no information. Collapses and fallbacks wake dependers,
    /// so each stage may refill the queue and restart the loop.
    ///
    /// Returns early (with the store quiescent but not final) if the store is
    /// suspended. Otherwise, on return every queried cell is final, or the
    /// first fatal error encountered is returned.
    pub fn wait_on_phase_completion(&self) -> Result<(), StoreError> {
        self.queue.clear_abort();
        loop {
            self.drain();
            if self.is_suspended() {
                log::debug!(target: "phase", "suspended; leaving phase incomplete");
                return Ok(());
            }
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            if self.resolve_cycles()? {
                continue;
            }
            if self.apply_fallbacks()? {
                continue;
            }
            break;
        }
        let stats = self.statistics();
        log::debug!(
            target: "phase",
            "phase {} complete: {stats:?}",
            self.phase.lock().index,
        );
        if self.config.debug() {
            self.verify_completion();
        }
        Ok(())
    }

    /// Collapse closed strongly-connected components of refinable cells.
    ///
    /// At quiescence no queued work can improve an interim cell, so a
    /// component whose members depend only on each other can never move past
    /// its current upper bounds; each member is fixed there (or at the kind's
    /// simplification of its interval). Components with edges leaving the
    /// component are left alone: a later fallback or another collapse must
    /// resolve their external dependees first, after which the completion
    /// loop comes back around.
    fn resolve_cycles(&self) -> Result<bool, StoreError> {
        let mut refinable: Vec<Refinable> = {
            let cells = self.cells.read();
            cells
                .iter()
                .filter_map(|(key, cell)| {
                    let cell = cell.lock();
                    match &cell.state {
                        EpState::Interim { lb, ub } => Some(Refinable {
                            key: *key,
                            lb: lb.clone(),
                            ub: ub.clone(),
                            dependees: cell.dependees.clone(),
                            open: false,
                        }),
                        _ => None,
                    }
                })
                .collect()
        };
        if refinable.is_empty() {
            return Ok(false);
        }

        let interim: FxHashSet<EpKey> = refinable.iter().map(|r| r.key).collect();
        let mut graph = DiGraphMap::<u64, ()>::new();
        for r in &refinable {
            graph.add_node(r.key.pack());
        }
        for r in &mut refinable {
            for dep in &r.dependees {
                if interim.contains(dep) {
                    graph.add_edge(r.key.pack(), dep.pack(), ());
                } else {
                    r.open = true;
                }
            }
        }

        let by_key: FxHashMap<EpKey, &Refinable> =
            refinable.iter().map(|r| (r.key, r)).collect();
        let mut collapsed = 0u64;
        for component in tarjan_scc(&graph) {
            let members: FxHashSet<EpKey> =
                component.iter().map(|packed| EpKey::unpack(*packed)).collect();
            let closed = members.iter().all(|key| {
                let r = by_key[key];
                !r.open && r.dependees.iter().all(|dep| members.contains(dep))
            });
            if !closed {
                continue;
            }
            log::debug!(
                target: "phase",
                "collapsing a closed component of {} cells to their upper bounds",
                members.len(),
            );
            // Retire every member's suspension first, so finalizing one member
            // does not wake stale continuations of the others.
            for key in &members {
                self.clear_edges(*key);
            }
            for key in &members {
                let r = by_key[key];
                let value = self
                    .registry
                    .simplify(key.kind, &r.lb, &r.ub)
                    .unwrap_or_else(|| r.ub.clone());
                self.commit_final(*key, value)?;
                collapsed += 1;
            }
        }
        if collapsed > 0 {
            StoreStats::add(&self.stats.cells_collapsed, collapsed);
        }
        Ok(collapsed > 0)
    }

    /// Install fallback values for queried or forced cells that still hold no
    /// information.
    ///
    /// The fallback reason distinguishes kinds no analysis in this phase
    /// derives at all from kinds whose scheduled analysis simply never got to
    /// this entity.
    fn apply_fallbacks(&self) -> Result<bool, StoreError> {
        let targets: Vec<EpKey> = {
            let cells = self.cells.read();
            cells
                .iter()
                .filter_map(|(key, cell)| {
                    let cell = cell.lock();
                    (cell.state.is_epk() && (cell.queried || cell.forced)).then_some(*key)
                })
                .collect()
        };
        let mut installed = 0u64;
        for key in targets {
            let reason = if self.phase.lock().derives(key.kind) {
                FallbackReason::NotYetDerivedByScheduledAnalysis
            } else {
                FallbackReason::NotComputedByAnyAnalysis
            };
            let value = self.registry.fallback(key.kind, reason);
            log::debug!(target: "phase", "installing fallback for {key} ({reason:?})");
            let changed =
                self.commit_with(key, false, |state| {
                    state.is_epk().then_some(EpState::Final(value))
                })?;
            if changed {
                installed += 1;
            }
        }
        if installed > 0 {
            StoreStats::add(&self.stats.fallbacks_installed, installed);
        }
        Ok(installed > 0)
    }

    /// Soundness check run with `debug` enabled: after completion, every
    /// queried cell must be final.
    fn verify_completion(&self) {
        let cells = self.cells.read();
        for (key, cell) in cells.iter() {
            let cell = cell.lock();
            if (cell.queried || cell.forced) && !cell.state.is_final() {
                panic!("phase completed with non-final queried cell {key}: {:?}", cell.state);
            }
        }
    }
}
