use core::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::{AnalysisError, Entity, Ep, EpState, PropertyKind, PropertyStore, PropertyValue};

/// What an analysis (or continuation) hands back to the store.
pub type AnalysisOutcome = Result<ComputationResult, AnalysisError>;

/// A schedulable analysis: maps an entity to a computation result, querying
/// the store for any properties it depends on along the way.
pub type AnalysisFn = Arc<dyn Fn(&PropertyStore, &Entity) -> AnalysisOutcome + Send + Sync>;

/// The closure invoked by the scheduler when a dependee of a suspended
/// computation updates.
///
/// Continuations are one-shot: by the time one runs, the depender's previous
/// edge set has been retired, and whatever result the continuation returns
/// installs the next one. The [Ep] argument reflects the most recent state of
/// the dependee whose update woke the computation.
pub type Continuation = Box<dyn FnOnce(&PropertyStore, Ep) -> AnalysisOutcome + Send>;

/// A collaborative read-modify-write over one cell, applied under the cell's
/// critical section.
///
/// Returning `None` means "no change". Update functions are required by
/// contract to be commutative and associative with respect to concurrent
/// application, and must not call back into the store.
pub type PartialUpdateFn = Box<dyn FnOnce(&EpState) -> Option<EpState> + Send>;

/// Wrap a closure as a schedulable [AnalysisFn].
pub fn analysis_fn<F>(f: F) -> AnalysisFn
where
    F: Fn(&PropertyStore, &Entity) -> AnalysisOutcome + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A final value for one cell.
#[derive(Clone, Debug)]
pub struct FinalUpdate {
    pub entity: Entity,
    pub kind: PropertyKind,
    pub value: PropertyValue,
}

/// An intermediate result: current bounds for the cell being computed, the
/// dependee snapshots the analysis is reacting to, and the continuation to
/// run when any of them improves.
pub struct InterimUpdate {
    pub entity: Entity,
    pub kind: PropertyKind,
    pub lb: PropertyValue,
    pub ub: PropertyValue,
    pub dependees: SmallVec<[Ep; 4]>,
    pub continuation: Continuation,
}

/// The result variants an analysis may return.
pub enum ComputationResult {
    /// The analysis does not wish to contribute.
    NoResult,
    /// A final value; dependers are woken and the cell accepts no further
    /// updates.
    Final(FinalUpdate),
    /// Bounds plus a dependency set and continuation; the computation is
    /// suspended until a dependee improves.
    Interim(InterimUpdate),
    /// Final values for several cells at once.
    Multi(Vec<FinalUpdate>),
    /// A final value for one entity plus follow-on computations the analysis
    /// requests for other entities.
    Incremental {
        result: FinalUpdate,
        pending: Vec<(AnalysisFn, Entity)>,
    },
    /// Update a single cell without claiming ownership of it.
    Partial {
        entity: Entity,
        kind: PropertyKind,
        update: PartialUpdateFn,
    },
}

impl ComputationResult {
    pub fn finalized(entity: Entity, kind: PropertyKind, value: PropertyValue) -> Self {
        Self::Final(FinalUpdate { entity, kind, value })
    }

    pub fn interim(
        entity: Entity,
        kind: PropertyKind,
        lb: PropertyValue,
        ub: PropertyValue,
        dependees: impl IntoIterator<Item = Ep>,
        continuation: Continuation,
    ) -> Self {
        Self::Interim(InterimUpdate {
            entity,
            kind,
            lb,
            ub,
            dependees: dependees.into_iter().collect(),
            continuation,
        })
    }

    pub fn incremental(
        result: FinalUpdate,
        pending: impl IntoIterator<Item = (AnalysisFn, Entity)>,
    ) -> Self {
        Self::Incremental {
            result,
            pending: pending.into_iter().collect(),
        }
    }

    pub fn partial(
        entity: Entity,
        kind: PropertyKind,
        update: impl FnOnce(&EpState) -> Option<EpState> + Send + 'static,
    ) -> Self {
        Self::Partial {
            entity,
            kind,
            update: Box::new(update),
        }
    }
}

impl fmt::Debug for ComputationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResult => f.write_str("NoResult"),
            Self::Final(update) => f.debug_tuple("Final").field(update).finish(),
            Self::Interim(update) => f
                .debug_struct("Interim")
                .field("entity", &update.entity)
                .field("kind", &update.kind)
                .field("lb", &update.lb)
                .field("ub", &update.ub)
                .field("dependees", &update.dependees.len())
                .finish_non_exhaustive(),
            Self::Multi(updates) => f.debug_tuple("Multi").field(updates).finish(),
            Self::Incremental { result, pending } => f
                .debug_struct("Incremental")
                .field("result", result)
                .field("pending", &pending.len())
                .finish(),
            Self::Partial { entity, kind, .. } => f
                .debug_struct("Partial")
                .field("entity", entity)
                .field("kind", kind)
                .finish_non_exhaustive(),
        }
    }
}
