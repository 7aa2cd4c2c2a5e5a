use core::fmt;

use crate::{Entity, EpState, PropertyKind};

/// A description of a task the scheduler is about to run, as reported to
/// [Tracer::on_dispatch].
#[derive(Clone)]
pub enum DispatchedTask {
    /// An initial (eagerly scheduled or incremental follow-on) analysis task.
    Analysis { entity: Entity },
    /// A lazy computation triggered by the first query of its cell.
    Lazy { entity: Entity, kind: PropertyKind },
    /// A triggered computation firing on the first observed property of its
    /// kind for the entity.
    Triggered { entity: Entity, kind: PropertyKind },
    /// An on-update continuation of a suspended computation.
    Continuation {
        depender: (Entity, PropertyKind),
        dependee: (Entity, PropertyKind),
    },
}

impl fmt::Debug for DispatchedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis { entity } => write!(f, "Analysis({entity:?})"),
            Self::Lazy { entity, kind } => write!(f, "Lazy({entity:?}, {kind})"),
            Self::Triggered { entity, kind } => write!(f, "Triggered({entity:?}, {kind})"),
            Self::Continuation { depender, dependee } => write!(
                f,
                "Continuation({:?}/{} <- {:?}/{})",
                depender.0, depender.1, dependee.0, dependee.1
            ),
        }
    }
}

/// A debug subscriber observing EP transitions and task dispatches.
///
/// Tracers are invoked synchronously from inside the engine and must be
/// side-effect-free with respect to the store: calling back into the store
/// from a tracer is not supported.
pub trait Tracer: Send + Sync {
    /// Called after a cell transitions from `before` to `after`.
    fn on_transition(
        &self,
        _entity: &Entity,
        _kind: PropertyKind,
        _before: &EpState,
        _after: &EpState,
    ) {
    }

    /// Called immediately before a task is executed.
    fn on_dispatch(&self, _task: &DispatchedTask) {}
}
