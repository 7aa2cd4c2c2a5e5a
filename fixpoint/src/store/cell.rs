use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::{Continuation, EpKey, EpState};

/// One entity/property-kind record.
///
/// A cell plays two roles at once: it holds the current interval for its own
/// key, and it owns the suspension state (forward edges plus continuation) of
/// the computation deriving that key, if one is suspended on dependees.
///
/// Cells are created lazily on first query and live until store shutdown.
pub(crate) struct Cell {
    pub state: EpState,
    /// Reverse edges: keys whose suspended computations react to updates of
    /// this cell.
    pub dependers: FxHashSet<EpKey>,
    /// Forward edges owned by this cell's suspended computation. Taken
    /// together with `continuation`, and always replaced as a unit.
    pub dependees: SmallVec<[EpKey; 4]>,
    /// The one-shot continuation of this cell's suspended computation.
    pub continuation: Option<Continuation>,
    /// An analysis or client observed this cell; it must be final by phase
    /// completion.
    pub queried: bool,
    /// External interest registered via `force`.
    pub forced: bool,
    /// The phase in which a lazy computation for this cell was scheduled, so
    /// repeat queries within the phase are no-ops.
    pub lazy_triggered_in: Option<u32>,
    /// Triggered computations for this cell's kind have already fired.
    pub trigger_fired: bool,
}

impl Cell {
    pub fn new() -> Self {
        Self {
            state: EpState::Epk,
            dependers: FxHashSet::default(),
            dependees: SmallVec::new(),
            continuation: None,
            queried: false,
            forced: false,
            lazy_triggered_in: None,
            trigger_fired: false,
        }
    }
}
