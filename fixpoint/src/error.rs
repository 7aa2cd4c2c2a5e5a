use compact_str::CompactString;
use thiserror::Error;

use crate::{Entity, EpState, PropertyKind};

/// A boxed error produced by user-supplied analysis code.
pub type AnalysisError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// The error taxonomy of the property store.
///
/// `BadUpdate` is only raised when the store runs with `debug` checks enabled;
/// without them, non-monotonic updates are silently clamped. The remaining
/// variants are fatal regardless of configuration, except where
/// `suppress_error` downgrades them to logs.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A bounds update violated monotonicity for the given cell.
    #[error("monotonicity violated for {kind} of {entity:?}: {detail}")]
    BadUpdate {
        entity: Entity,
        kind: PropertyKind,
        detail: CompactString,
    },

    /// An attempt was made to mutate a cell that is already final.
    #[error("property {kind} of {entity:?} is already final")]
    AlreadyFinal { entity: Entity, kind: PropertyKind },

    /// Two lazy computations were registered for the same kind in one phase.
    #[error("a lazy computation is already registered for {kind} in this phase")]
    DuplicateLazy { kind: PropertyKind },

    /// A kind was registered under a name that is already taken.
    #[error("a property kind named `{name}` is already registered")]
    DuplicateKind { name: CompactString },

    /// A query named a kind outside the current phase declarations.
    #[error("{kind} is not derived or consumed by the current phase")]
    UnknownKind { kind: PropertyKind },

    /// A user analysis or continuation failed; the context records the cell
    /// the computation was working on and its last observed state.
    #[error("analysis of {kind:?} for {entity:?} failed (observed {observed:?})")]
    Analysis {
        entity: Entity,
        kind: Option<PropertyKind>,
        observed: Option<EpState>,
        #[source]
        source: AnalysisError,
    },
}
