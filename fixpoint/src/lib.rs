//! A concurrent fixed-point property computation engine.
//!
//! The engine computes interdependent *properties* of *entities* by running a
//! collection of monotonic analyses until a mutual fixed point is reached.
//! Every in-flight value is an interval over a bounded lattice; intervals only
//! ever tighten, which is what guarantees termination even when analyses are
//! mutually recursive and the dependency graph is cyclic.
//!
//! The moving parts:
//!
//! * [PropertyKindRegistry] — defines, per [PropertyKind], the lattice
//!   (bottom/top/meet), the fallback rule, and the optional fast-track and
//!   simplification hooks.
//! * [PropertyStore] — the entity/property table. Analyses query it via
//!   [apply](PropertyStore::apply), return [ComputationResult]s, and suspend
//!   themselves on dependees by returning an intermediate result with a
//!   [Continuation].
//! * Phases — [setup_phase](PropertyStore::setup_phase) declares the kinds a
//!   phase derives and consumes;
//!   [wait_on_phase_completion](PropertyStore::wait_on_phase_completion)
//!   drains the scheduler, collapses dependency cycles, applies fallbacks,
//!   and returns once every queried cell is [Final](EpState::Final).

mod config;
mod entity;
mod ep;
mod error;
mod kind;
mod property;
mod result;
mod store;
mod tracer;

pub(crate) use self::entity::EntityInterner;
pub use self::{
    config::{DependeeUpdateHandling, ExecutionMode, StoreConfig},
    entity::{Entity, EntityId, ErasedEntity},
    ep::{Ep, EpKey, EpState},
    error::{AnalysisError, StoreError},
    kind::{
        FallbackFn, FallbackReason, FastTrackFn, Lattice, MeetFn, PropertyKind,
        PropertyKindBuilder, PropertyKindRegistry, SimplifyFn,
    },
    property::{ErasedProperty, PropertyValue},
    result::{
        AnalysisFn, AnalysisOutcome, ComputationResult, Continuation, FinalUpdate, InterimUpdate,
        PartialUpdateFn, analysis_fn,
    },
    store::{PropertyStore, StoreStatistics},
    tracer::{DispatchedTask, Tracer},
};
