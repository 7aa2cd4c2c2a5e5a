mod cell;
mod phase;
mod queue;
mod stats;
mod update;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

pub use self::stats::StoreStatistics;
use self::{
    cell::Cell,
    phase::PhaseState,
    queue::{Task, TaskQueue},
    stats::StoreStats,
};
use crate::{
    AnalysisFn, DispatchedTask, Entity, EntityId, EntityInterner, Ep, EpKey, EpState,
    ExecutionMode, PropertyKind, PropertyKindRegistry, PropertyValue, StoreConfig, StoreError,
    Tracer,
};

/// The entity/property table and the machinery that drives it to a mutual
/// fixed point.
///
/// A store is created over a [PropertyKindRegistry], configured once at
/// construction, and then driven through phases: analyses are registered or
/// scheduled, queries record interest, and
/// [wait_on_phase_completion](Self::wait_on_phase_completion) runs tasks,
/// collapses dependency cycles, and installs fallbacks until every queried
/// cell is final.
///
/// There is no process-level store; every instance is passed explicitly to the
/// analyses it runs.
pub struct PropertyStore {
    config: StoreConfig,
    registry: Arc<PropertyKindRegistry>,
    entities: RwLock<EntityInterner>,
    cells: RwLock<FxHashMap<EpKey, Arc<Mutex<Cell>>>>,
    /// Entities that have a cell of a given kind, in creation order.
    kind_index: RwLock<FxHashMap<PropertyKind, Vec<EntityId>>>,
    queue: TaskQueue,
    phase: Mutex<PhaseState>,
    /// The first fatal error observed while draining; surfaced from
    /// [wait_on_phase_completion](Self::wait_on_phase_completion).
    failure: Mutex<Option<StoreError>>,
    tracer: Option<Arc<dyn Tracer>>,
    stats: StoreStats,
}

impl PropertyStore {
    /// Create a store with the default (sequential) configuration.
    pub fn new(registry: Arc<PropertyKindRegistry>) -> Self {
        Self::with_config(registry, StoreConfig::default())
    }

    pub fn with_config(registry: Arc<PropertyKindRegistry>, config: StoreConfig) -> Self {
        log::debug!(target: "property-store", "creating store ({:?})", config.execution());
        Self {
            config,
            registry,
            entities: RwLock::default(),
            cells: RwLock::default(),
            kind_index: RwLock::default(),
            queue: TaskQueue::default(),
            phase: Mutex::new(PhaseState::default()),
            failure: Mutex::new(None),
            tracer: None,
            stats: StoreStats::default(),
        }
    }

    /// Attach a debug tracer. Must be called before the store is driven.
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &PropertyKindRegistry {
        &self.registry
    }

    /// Query the current EP-state of `(entity, kind)`.
    ///
    /// Never blocks on analysis completion. If the cell holds no information
    /// yet, the kind's fast-track hook is consulted (when enabled), and
    /// otherwise a registered lazy computation for `kind` is scheduled — at
    /// most once per entity per phase; repeat queries are no-ops.
    pub fn apply(&self, entity: &Entity, kind: PropertyKind) -> Result<Ep, StoreError> {
        self.check_declared(kind)?;
        let key = self.key_for(entity, kind);
        let cell = self.cell(key);
        let state = {
            let mut cell = cell.lock();
            cell.queried = true;
            cell.state.clone()
        };
        if !state.is_epk() {
            return Ok(Ep::new(entity.clone(), kind, state));
        }

        // Fast track is consulted before any lazy scheduling.
        if self.config.use_fast_track()
            && let Some(value) = self.registry.fast_track(kind, entity)
        {
            StoreStats::bump(&self.stats.fast_track_hits);
            log::trace!(target: "property-store", "fast-track hit for {key}");
            self.commit_final(key, value)?;
            return Ok(self.snapshot(key));
        }

        let (phase_index, lazy) = {
            let phase = self.phase.lock();
            (phase.index, phase.lazy.get(&kind).cloned())
        };
        if let Some(analysis) = lazy {
            let schedule = {
                let mut cell = cell.lock();
                if cell.state.is_epk() && cell.lazy_triggered_in != Some(phase_index) {
                    cell.lazy_triggered_in = Some(phase_index);
                    true
                } else {
                    false
                }
            };
            if schedule {
                log::trace!(target: "scheduler", "scheduling lazy computation of {key}");
                self.queue.push(Task::Lazy {
                    analysis,
                    entity: entity.clone(),
                    kind,
                });
            }
        }
        Ok(self.snapshot(key))
    }

    /// Read the current EP-state without consulting fast-track hooks or
    /// scheduling lazy computations. The query still records interest.
    pub fn read(&self, entity: &Entity, kind: PropertyKind) -> Ep {
        let key = self.key_for(entity, kind);
        let cell = self.cell(key);
        let state = {
            let mut cell = cell.lock();
            cell.queried = true;
            cell.state.clone()
        };
        Ep::new(entity.clone(), kind, state)
    }

    /// Register external interest in `(entity, kind)`: by phase completion the
    /// cell is guaranteed to be final, via fallback if no analysis produces a
    /// value.
    pub fn force(&self, entity: &Entity, kind: PropertyKind) -> Result<(), StoreError> {
        let ep = self.apply(entity, kind)?;
        if !ep.is_final() {
            let key = self.key_for(entity, kind);
            self.cell(key).lock().forced = true;
        }
        Ok(())
    }

    /// Advance the lower bound of `(entity, kind)`.
    ///
    /// On a cell without information, the interval opens as `[lb, top]`. If
    /// the bounds collapse, the cell is promoted to final and dependers are
    /// woken.
    pub fn update_lower_bound(
        &self,
        entity: &Entity,
        kind: PropertyKind,
        lb: PropertyValue,
    ) -> Result<(), StoreError> {
        let key = self.key_for(entity, kind);
        self.commit_with(key, false, |state| {
            let ub = match state {
                EpState::Epk => self.registry.top(kind),
                EpState::Interim { ub, .. } | EpState::Final(ub) => ub.clone(),
            };
            Some(EpState::Interim { lb, ub })
        })
        .map(|_| ())
    }

    /// Advance the upper bound of `(entity, kind)`.
    ///
    /// On a cell without information, the interval opens as `[bottom, ub]`. If
    /// the bounds collapse, the cell is promoted to final and dependers are
    /// woken.
    pub fn update_upper_bound(
        &self,
        entity: &Entity,
        kind: PropertyKind,
        ub: PropertyValue,
    ) -> Result<(), StoreError> {
        let key = self.key_for(entity, kind);
        self.commit_with(key, false, |state| {
            let lb = match state {
                EpState::Epk => self.registry.bottom(kind),
                EpState::Interim { lb, .. } | EpState::Final(lb) => lb.clone(),
            };
            Some(EpState::Interim { lb, ub })
        })
        .map(|_| ())
    }

    /// The final value of `(entity, kind)`, if the cell has one.
    pub fn finalized(&self, entity: &Entity, kind: PropertyKind) -> Option<PropertyValue> {
        let id = self.entities.read().lookup(entity)?;
        let cell = self.existing_cell(EpKey { entity: id, kind })?;
        let state = cell.lock().state.clone();
        state.final_value().cloned()
    }

    /// Inject an eager, final value. Fails if the cell is already populated,
    /// whether final or not.
    pub fn set(
        &self,
        entity: &Entity,
        kind: PropertyKind,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        let key = self.key_for(entity, kind);
        log::trace!(target: "property-store", "set {key} = {value:?}");
        let changed = self.commit_with(key, true, |_| Some(EpState::Final(value)))?;
        debug_assert!(changed);
        Ok(())
    }

    /// Enqueue one task per entity for `analysis`.
    pub fn schedule_eager(
        &self,
        analysis: AnalysisFn,
        entities: impl IntoIterator<Item = Entity>,
    ) {
        let mut scheduled = 0usize;
        for entity in entities {
            self.queue.push(Task::Analysis {
                analysis: analysis.clone(),
                entity,
            });
            scheduled += 1;
        }
        log::debug!(target: "scheduler", "eagerly scheduled {scheduled} analysis tasks");
    }

    /// Register a lazy computation deriving `kind`, triggered by the first
    /// query of each cell of that kind. At most one lazy computation may be
    /// registered per kind per phase.
    pub fn register_lazy(
        &self,
        kind: PropertyKind,
        analysis: AnalysisFn,
    ) -> Result<(), StoreError> {
        let mut phase = self.phase.lock();
        if phase.lazy.contains_key(&kind) {
            return Err(StoreError::DuplicateLazy { kind });
        }
        phase.lazy.insert(kind, analysis);
        Ok(())
    }

    /// Register a computation fired once per entity, when the first property
    /// of kind `kind` is observed for that entity.
    pub fn register_triggered(&self, kind: PropertyKind, analysis: AnalysisFn) {
        self.phase.lock().triggered.entry(kind).or_default().push(analysis);
    }

    /// Cooperatively pause or resume the scheduler.
    ///
    /// While suspended, drain loops pick up no further tasks and
    /// [wait_on_phase_completion](Self::wait_on_phase_completion) returns
    /// promptly with the store quiescent but not final. Queued work is
    /// preserved and resumes on the next wait after `suspend(false)`.
    pub fn suspend(&self, yes: bool) {
        log::debug!(target: "scheduler", "suspended = {yes}");
        self.queue.set_suspended(yes);
    }

    pub fn is_suspended(&self) -> bool {
        self.queue.is_suspended()
    }

    /// Release all store state. Queued tasks, cells, and interned entities are
    /// dropped; nothing is persisted.
    pub fn shutdown(self) {
        let stats = self.stats.snapshot();
        log::debug!(target: "property-store", "shutting down: {stats:?}");
    }

    /// Returns true if any information (interim or final) has been recorded
    /// for `(entity, kind)`.
    pub fn has_property(&self, entity: &Entity, kind: PropertyKind) -> bool {
        let Some(id) = self.entities.read().lookup(entity) else {
            return false;
        };
        let key = EpKey { entity: id, kind };
        self.existing_cell(key)
            .is_some_and(|cell| !cell.lock().state.is_epk())
    }

    /// All EPs currently recorded for `kind`, in cell-creation order.
    pub fn entities_with_kind(&self, kind: PropertyKind) -> Vec<Ep> {
        let ids = match self.kind_index.read().get(&kind) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.into_iter()
            .map(|id| self.snapshot(EpKey { entity: id, kind }))
            .collect()
    }

    /// All EPs currently recorded for `entity`, across kinds.
    pub fn properties_of(&self, entity: &Entity) -> Vec<Ep> {
        let Some(id) = self.entities.read().lookup(entity) else {
            return Vec::new();
        };
        let keys: Vec<EpKey> = {
            let cells = self.cells.read();
            let mut keys: Vec<EpKey> =
                cells.keys().filter(|key| key.entity == id).copied().collect();
            keys.sort();
            keys
        };
        keys.into_iter().map(|key| self.snapshot(key)).collect()
    }

    pub fn statistics(&self) -> StoreStatistics {
        self.stats.snapshot()
    }

    // === internals ==========================================================

    pub(crate) fn entity_id(&self, entity: &Entity) -> EntityId {
        if let Some(id) = self.entities.read().lookup(entity) {
            return id;
        }
        self.entities.write().intern(entity)
    }

    pub(crate) fn resolve_entity(&self, id: EntityId) -> Entity {
        self.entities.read().get(id).clone()
    }

    pub(crate) fn key_for(&self, entity: &Entity, kind: PropertyKind) -> EpKey {
        EpKey {
            entity: self.entity_id(entity),
            kind,
        }
    }

    /// Get or lazily create the cell for `key`.
    pub(crate) fn cell(&self, key: EpKey) -> Arc<Mutex<Cell>> {
        if let Some(cell) = self.cells.read().get(&key) {
            return cell.clone();
        }
        let mut cells = self.cells.write();
        cells
            .entry(key)
            .or_insert_with(|| {
                self.kind_index.write().entry(key.kind).or_default().push(key.entity);
                Arc::new(Mutex::new(Cell::new()))
            })
            .clone()
    }

    pub(crate) fn existing_cell(&self, key: EpKey) -> Option<Arc<Mutex<Cell>>> {
        self.cells.read().get(&key).cloned()
    }

    pub(crate) fn snapshot_state(&self, key: EpKey) -> EpState {
        self.existing_cell(key)
            .map(|cell| cell.lock().state.clone())
            .unwrap_or(EpState::Epk)
    }

    pub(crate) fn snapshot(&self, key: EpKey) -> Ep {
        Ep::new(self.resolve_entity(key.entity), key.kind, self.snapshot_state(key))
    }

    fn check_declared(&self, kind: PropertyKind) -> Result<(), StoreError> {
        if !self.config.debug() {
            return Ok(());
        }
        let phase = self.phase.lock();
        if phase.derived.is_empty() && phase.consumed.is_empty() {
            return Ok(());
        }
        if phase.derived.contains(&kind)
            || phase.consumed.contains(&kind)
            || phase.lazy.contains_key(&kind)
            || phase.triggered.contains_key(&kind)
        {
            return Ok(());
        }
        Err(StoreError::UnknownKind { kind })
    }

    /// Record a fatal error. Returns true if draining should stop; with
    /// `suppress_error` set the error is logged and draining continues.
    pub(crate) fn record_failure(&self, err: StoreError) -> bool {
        if self.config.suppress_error() {
            log::error!(target: "property-store", "suppressed error: {err}");
            return false;
        }
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err);
        } else {
            log::error!(target: "property-store", "error after first failure: {err}");
        }
        self.queue.abort();
        true
    }

    pub(crate) fn take_failure(&self) -> Option<StoreError> {
        self.failure.lock().take()
    }

    /// Run queued tasks until the queue is empty, the store is suspended, or a
    /// fatal error aborts the drain.
    pub(crate) fn drain(&self) {
        match self.config.execution() {
            ExecutionMode::Sequential => self.drain_sequential(),
            ExecutionMode::Parallel(workers) => self.drain_parallel(workers.get()),
        }
    }

    fn drain_sequential(&self) {
        while let Some(task) = self.queue.pop() {
            if let Err(err) = self.run_task(task)
                && self.record_failure(err)
            {
                break;
            }
        }
    }

    fn drain_parallel(&self, workers: usize) {
        std::thread::scope(|scope| {
            for worker in 0..workers {
                scope.spawn(move || {
                    log::trace!(target: "scheduler", "worker {worker} started");
                    while let Some(task) = self.queue.pop_blocking() {
                        let _done = self.queue.completion_guard();
                        if let Err(err) = self.run_task(task) {
                            self.record_failure(err);
                        }
                    }
                    log::trace!(target: "scheduler", "worker {worker} exiting");
                });
            }
        });
    }

    fn run_task(&self, task: Task) -> Result<(), StoreError> {
        StoreStats::bump(&self.stats.tasks_executed);
        match task {
            Task::Analysis { analysis, entity } => {
                if let Some(tracer) = &self.tracer {
                    tracer.on_dispatch(&DispatchedTask::Analysis { entity: entity.clone() });
                }
                let outcome = analysis(self, &entity);
                self.handle_outcome(None, entity, None, None, outcome)
            }
            Task::Lazy { analysis, entity, kind } => {
                if let Some(tracer) = &self.tracer {
                    tracer.on_dispatch(&DispatchedTask::Lazy { entity: entity.clone(), kind });
                }
                let outcome = analysis(self, &entity);
                self.handle_outcome(None, entity, Some(kind), None, outcome)
            }
            Task::Triggered { analysis, entity, kind } => {
                if let Some(tracer) = &self.tracer {
                    tracer.on_dispatch(&DispatchedTask::Triggered {
                        entity: entity.clone(),
                        kind,
                    });
                }
                let outcome = analysis(self, &entity);
                self.handle_outcome(None, entity, Some(kind), None, outcome)
            }
            Task::Continuation { depender, dependee, continuation } => {
                let ep = self.snapshot(dependee);
                let entity = self.resolve_entity(depender.entity);
                if let Some(tracer) = &self.tracer {
                    tracer.on_dispatch(&DispatchedTask::Continuation {
                        depender: (entity.clone(), depender.kind),
                        dependee: (ep.entity.clone(), dependee.kind),
                    });
                }
                let observed = ep.state.clone();
                let outcome = continuation(self, ep);
                self.handle_outcome(
                    Some(depender),
                    entity,
                    Some(depender.kind),
                    Some(observed),
                    outcome,
                )
            }
        }
    }
}
