use smallvec::SmallVec;

use super::{queue::Task, stats::StoreStats};
use crate::{
    AnalysisOutcome, ComputationResult, Continuation, DependeeUpdateHandling, Entity, EpKey,
    EpState, InterimUpdate, PropertyKind, PropertyValue, StoreError,
};

/// Update processing: serialized per-cell commits, monotonicity enforcement,
/// and depender notification.
///
/// Every state change funnels through [PropertyStore::commit_with], which
/// holds the cell's lock for the validate-and-write step only; user code and
/// other cells' locks are never touched while it is held. The one sanctioned
/// exception is a `PartialResult` update function, which runs its
/// read-modify-write inside the critical section by design.
impl super::PropertyStore {
    /// Validate `proposed` against `current`, yielding the state to write
    /// (`None` for a no-op).
    ///
    /// With `debug` checks enabled, violations of interval monotonicity are
    /// `BadUpdate` errors; otherwise the offending bound is clamped so the
    /// interval still only tightens.
    fn transition(
        &self,
        key: EpKey,
        current: &EpState,
        proposed: EpState,
    ) -> Result<Option<EpState>, StoreError> {
        let kind = key.kind;
        let registry = self.registry();
        match (current, proposed) {
            (EpState::Final(p), EpState::Final(q)) => {
                if *p == q {
                    Ok(None)
                } else {
                    Err(self.already_final(key))
                }
            }
            (EpState::Final(_), _) => Err(self.already_final(key)),
            (EpState::Epk, EpState::Epk) | (EpState::Interim { .. }, EpState::Epk) => Ok(None),
            (EpState::Epk, EpState::Final(p)) => Ok(Some(EpState::Final(p))),
            (EpState::Epk, EpState::Interim { lb, ub }) => {
                if lb == ub {
                    return Ok(Some(EpState::Final(lb)));
                }
                if self.config().debug() && !registry.leq(kind, &lb, &ub) {
                    return Err(
                        self.bad_update(key, format!("bounds [{lb:?}, {ub:?}] are not ordered"))
                    );
                }
                Ok(Some(EpState::Interim { lb, ub }))
            }
            (EpState::Interim { lb, ub }, EpState::Final(p)) => {
                if self.config().debug()
                    && !(registry.leq(kind, lb, &p) && registry.leq(kind, &p, ub))
                {
                    return Err(self.bad_update(
                        key,
                        format!("final value {p:?} lies outside [{lb:?}, {ub:?}]"),
                    ));
                }
                Ok(Some(EpState::Final(p)))
            }
            (EpState::Interim { lb, ub }, EpState::Interim { lb: new_lb, ub: new_ub }) => {
                let lb_ok = registry.leq(kind, lb, &new_lb);
                let ub_ok = registry.leq(kind, &new_ub, ub);
                if self.config().debug() && !(lb_ok && ub_ok) {
                    return Err(self.bad_update(
                        key,
                        format!("[{new_lb:?}, {new_ub:?}] does not refine [{lb:?}, {ub:?}]"),
                    ));
                }
                let next_lb = if lb_ok { new_lb } else { lb.clone() };
                let next_ub = if ub_ok {
                    new_ub
                } else {
                    registry.meet(kind, ub, &new_ub)
                };
                if next_lb == *lb && next_ub == *ub {
                    return Ok(None);
                }
                if next_lb == next_ub {
                    Ok(Some(EpState::Final(next_lb)))
                } else {
                    Ok(Some(EpState::Interim { lb: next_lb, ub: next_ub }))
                }
            }
        }
    }

    /// Commit a state change computed by `make` under the cell's lock.
    ///
    /// Returns whether the cell actually changed. On a change, dependers are
    /// notified (and dropped from the cell if it became final), and triggered
    /// computations fire if the cell left the no-information state.
    pub(crate) fn commit_with(
        &self,
        key: EpKey,
        require_epk: bool,
        make: impl FnOnce(&EpState) -> Option<EpState>,
    ) -> Result<bool, StoreError> {
        let cell = self.cell(key);
        let (before, after, dependers) = {
            let mut cell = cell.lock();
            if require_epk && !cell.state.is_epk() {
                return Err(self.already_final(key));
            }
            let Some(proposed) = make(&cell.state) else {
                return Ok(false);
            };
            let before = cell.state.clone();
            let Some(after) = self.transition(key, &before, proposed)? else {
                return Ok(false);
            };
            cell.state = after.clone();
            let dependers: Vec<EpKey> = if after.is_final() {
                cell.dependers.drain().collect()
            } else {
                cell.dependers.iter().copied().collect()
            };
            (before, after, dependers)
        };
        StoreStats::bump(&self.stats.updates_committed);
        log::trace!(target: "property-store", "{key}: {before:?} -> {after:?}");
        if let Some(tracer) = &self.tracer {
            tracer.on_transition(&self.resolve_entity(key.entity), key.kind, &before, &after);
        }
        if before.is_epk() {
            self.fire_triggered(key);
        }
        if !dependers.is_empty() {
            self.notify_dependers(key, dependers, after.is_final());
        }
        Ok(true)
    }

    pub(crate) fn commit_final(&self, key: EpKey, value: PropertyValue) -> Result<(), StoreError> {
        self.commit_with(key, false, |_| Some(EpState::Final(value))).map(|_| ())
    }

    /// Fire any triggered computations registered for `key.kind`, once per
    /// entity.
    fn fire_triggered(&self, key: EpKey) {
        let analyses = match self.phase.lock().triggered.get(&key.kind) {
            Some(analyses) if !analyses.is_empty() => analyses.clone(),
            _ => return,
        };
        let cell = self.cell(key);
        {
            let mut cell = cell.lock();
            if cell.trigger_fired {
                return;
            }
            cell.trigger_fired = true;
        }
        let entity = self.resolve_entity(key.entity);
        log::trace!(target: "scheduler", "firing {} triggered computations for {key}", analyses.len());
        for analysis in analyses {
            self.queue.push(Task::Triggered {
                analysis,
                entity: entity.clone(),
                kind: key.kind,
            });
        }
    }

    /// Wake every depender of `dependee`: take its continuation, retire its
    /// edge set, and dispatch the continuation per the configured handling.
    ///
    /// A depender whose continuation was already claimed by a concurrent
    /// update is skipped; the continuation it installs next will re-observe
    /// the current state of anything it still depends on.
    pub(crate) fn notify_dependers(&self, dependee: EpKey, dependers: Vec<EpKey>, is_final: bool) {
        for depender in dependers {
            let Some(cell) = self.existing_cell(depender) else {
                continue;
            };
            let taken = {
                let mut cell = cell.lock();
                cell.continuation
                    .take()
                    .map(|c| (c, core::mem::take(&mut cell.dependees)))
            };
            let Some((continuation, dependees)) = taken else {
                continue;
            };
            for dep in dependees {
                if let Some(dep_cell) = self.existing_cell(dep) {
                    dep_cell.lock().dependers.remove(&depender);
                }
            }
            self.dispatch_continuation(depender, dependee, continuation, is_final);
        }
    }

    fn dispatch_continuation(
        &self,
        depender: EpKey,
        dependee: EpKey,
        continuation: Continuation,
        is_final: bool,
    ) {
        let task = Task::Continuation {
            depender,
            dependee,
            continuation,
        };
        if self.config.delay_depender_notification() {
            self.queue.push_deferred(task);
            return;
        }
        match self.config.dependee_update_handling() {
            DependeeUpdateHandling::Eager => self.queue.push(task),
            DependeeUpdateHandling::Lazy { delay_final, delay_non_final } => {
                if is_final {
                    if delay_final {
                        self.queue.push_delayed_final(task);
                    } else {
                        self.queue.push_last(task);
                    }
                } else if delay_non_final {
                    self.queue.push_delayed_non_final(task);
                } else {
                    self.queue.push_last(task);
                }
            }
        }
    }

    /// Drop a cell's suspension state: its continuation and forward edges.
    pub(crate) fn clear_edges(&self, key: EpKey) {
        let Some(cell) = self.existing_cell(key) else {
            return;
        };
        let (continuation, dependees) = {
            let mut cell = cell.lock();
            (cell.continuation.take(), core::mem::take(&mut cell.dependees))
        };
        drop(continuation);
        for dep in dependees {
            if let Some(dep_cell) = self.existing_cell(dep) {
                dep_cell.lock().dependers.remove(&key);
            }
        }
    }

    /// Process whatever an analysis or continuation handed back.
    ///
    /// `origin` is set when the computation was a continuation, identifying
    /// the cell whose suspension produced it; on failure that cell loses its
    /// edges, as if the computation had terminated.
    pub(crate) fn handle_outcome(
        &self,
        origin: Option<EpKey>,
        entity: Entity,
        kind: Option<PropertyKind>,
        observed: Option<EpState>,
        outcome: AnalysisOutcome,
    ) -> Result<(), StoreError> {
        match outcome {
            Ok(result) => self.handle_result(result),
            Err(source) => {
                if let Some(origin) = origin {
                    self.clear_edges(origin);
                }
                Err(StoreError::Analysis {
                    entity,
                    kind,
                    observed,
                    source,
                })
            }
        }
    }

    pub(crate) fn handle_result(&self, result: ComputationResult) -> Result<(), StoreError> {
        match result {
            ComputationResult::NoResult => Ok(()),
            ComputationResult::Final(update) => {
                let key = self.key_for(&update.entity, update.kind);
                self.commit_final(key, update.value)
            }
            ComputationResult::Multi(updates) => {
                for update in updates {
                    let key = self.key_for(&update.entity, update.kind);
                    self.commit_final(key, update.value)?;
                }
                Ok(())
            }
            ComputationResult::Incremental { result, pending } => {
                let key = self.key_for(&result.entity, result.kind);
                self.commit_final(key, result.value)?;
                for (analysis, entity) in pending {
                    self.queue.push(Task::Analysis { analysis, entity });
                }
                Ok(())
            }
            ComputationResult::Partial { entity, kind, update } => {
                let key = self.key_for(&entity, kind);
                self.commit_with(key, false, |state| update(state)).map(|_| ())
            }
            ComputationResult::Interim(update) => self.handle_interim(update),
        }
    }

    /// Commit an intermediate result and install the computation's new
    /// suspension (continuation + forward edges) as a unit.
    fn handle_interim(&self, update: InterimUpdate) -> Result<(), StoreError> {
        let InterimUpdate {
            entity,
            kind,
            lb,
            ub,
            dependees,
            continuation,
        } = update;
        let key = self.key_for(&entity, kind);

        // Resolve dependee snapshots to keys before touching any cell lock.
        let observed: Vec<(EpKey, EpState)> = dependees
            .into_iter()
            .map(|ep| (self.key_for(&ep.entity, ep.kind), ep.state))
            .collect();

        self.commit_with(key, false, |_| Some(EpState::Interim { lb, ub }))?;
        if self.snapshot_state(key).is_final() {
            // Bounds collapsed; the computation is done and installs no edges.
            return Ok(());
        }

        // The continuation must be in place before any reverse edge is
        // published, or a concurrent dependee update could find nothing to
        // wake.
        let cell = self.cell(key);
        let retired: SmallVec<[EpKey; 4]> = {
            let mut cell = cell.lock();
            let retired = core::mem::take(&mut cell.dependees);
            cell.continuation = Some(continuation);
            cell.dependees = observed.iter().map(|(dep, _)| *dep).collect();
            retired
        };
        for dep in retired {
            if observed.iter().all(|(new_dep, _)| *new_dep != dep)
                && let Some(dep_cell) = self.existing_cell(dep)
            {
                dep_cell.lock().dependers.remove(&key);
            }
        }

        // Publish reverse edges, checking each dependee against the snapshot
        // the analysis saw. An improvement that landed in between must wake
        // the continuation here; once the reverse edge is visible, later
        // updates will.
        let mut advanced: Option<EpKey> = None;
        for (dep, seen) in &observed {
            let dep_cell = self.cell(*dep);
            let current = {
                let mut dep_cell = dep_cell.lock();
                dep_cell.dependers.insert(key);
                dep_cell.state.clone()
            };
            if advanced.is_none() && current != *seen {
                advanced = Some(*dep);
            }
        }
        if let Some(dep) = advanced {
            let taken = {
                let mut cell = cell.lock();
                cell.continuation
                    .take()
                    .map(|c| (c, core::mem::take(&mut cell.dependees)))
            };
            if let Some((continuation, deps)) = taken {
                for d in deps {
                    if let Some(dep_cell) = self.existing_cell(d) {
                        dep_cell.lock().dependers.remove(&key);
                    }
                }
                log::trace!(
                    target: "scheduler",
                    "dependee {dep} advanced during registration; rescheduling {key}"
                );
                let is_final = self.snapshot_state(dep).is_final();
                self.dispatch_continuation(key, dep, continuation, is_final);
            }
        }
        Ok(())
    }

    fn already_final(&self, key: EpKey) -> StoreError {
        StoreError::AlreadyFinal {
            entity: self.resolve_entity(key.entity),
            kind: key.kind,
        }
    }

    fn bad_update(&self, key: EpKey, detail: String) -> StoreError {
        StoreError::BadUpdate {
            entity: self.resolve_entity(key.entity),
            kind: key.kind,
            detail: detail.into(),
        }
    }
}
