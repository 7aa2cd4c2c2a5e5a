use core::fmt;

use crate::{Entity, EntityId, PropertyKind, PropertyValue};

/// The key identifying one entity/property-kind cell.
///
/// Keys are pairs of dense ids, so they double as dependency-edge tags and as
/// nodes of the cycle-resolution graph.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpKey {
    pub entity: EntityId,
    pub kind: PropertyKind,
}

impl EpKey {
    #[inline]
    pub(crate) fn pack(self) -> u64 {
        (u64::from(self.entity.as_u32()) << 32) | u64::from(self.kind.as_u32())
    }

    #[inline]
    pub(crate) fn unpack(packed: u64) -> Self {
        Self {
            entity: EntityId::from_u32((packed >> 32) as u32),
            kind: PropertyKind::from_u32(packed as u32),
        }
    }
}

impl fmt::Display for EpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}/{}", self.entity.as_u32(), self.kind)
    }
}

/// The state of one entity/property-kind cell.
///
/// States only move forward: `Epk → Interim → Final`, with interim bounds
/// tightening monotonically (`lb` rises, `ub` falls) until they collapse.
#[derive(Clone, PartialEq, Eq)]
pub enum EpState {
    /// No information has been recorded.
    Epk,
    /// The current interval; `lb ≤ ub` and `lb ≠ ub`.
    Interim { lb: PropertyValue, ub: PropertyValue },
    /// The interval has collapsed; no further updates are permitted.
    Final(PropertyValue),
}

impl EpState {
    #[inline]
    pub fn is_epk(&self) -> bool {
        matches!(self, EpState::Epk)
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        matches!(self, EpState::Final(_))
    }

    /// Returns true if the cell may still receive updates.
    #[inline]
    pub fn is_refinable(&self) -> bool {
        !self.is_final()
    }

    /// The current lower bound, if any information has been recorded.
    pub fn lb(&self) -> Option<&PropertyValue> {
        match self {
            EpState::Epk => None,
            EpState::Interim { lb, .. } => Some(lb),
            EpState::Final(p) => Some(p),
        }
    }

    /// The current upper bound, if any information has been recorded.
    pub fn ub(&self) -> Option<&PropertyValue> {
        match self {
            EpState::Epk => None,
            EpState::Interim { ub, .. } => Some(ub),
            EpState::Final(p) => Some(p),
        }
    }

    pub fn final_value(&self) -> Option<&PropertyValue> {
        match self {
            EpState::Final(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Debug for EpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpState::Epk => f.write_str("Epk"),
            EpState::Interim { lb, ub } => write!(f, "Interim[{lb:?}, {ub:?}]"),
            EpState::Final(p) => write!(f, "Final({p:?})"),
        }
    }
}

/// An entity/property pair with its observed state, as handed to analyses.
///
/// This is a snapshot: the underlying cell may advance after the snapshot is
/// taken, which is exactly what dependency registration and continuations
/// exist to observe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ep {
    pub entity: Entity,
    pub kind: PropertyKind,
    pub state: EpState,
}

impl Ep {
    pub fn new(entity: Entity, kind: PropertyKind, state: EpState) -> Self {
        Self { entity, kind, state }
    }

    #[inline]
    pub fn is_epk(&self) -> bool {
        self.state.is_epk()
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        self.state.is_final()
    }

    #[inline]
    pub fn is_refinable(&self) -> bool {
        self.state.is_refinable()
    }

    pub fn lb(&self) -> Option<&PropertyValue> {
        self.state.lb()
    }

    pub fn ub(&self) -> Option<&PropertyValue> {
        self.state.ub()
    }

    pub fn final_value(&self) -> Option<&PropertyValue> {
        self.state.final_value()
    }
}
