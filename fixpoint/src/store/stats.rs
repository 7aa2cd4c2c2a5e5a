use core::sync::atomic::{AtomicU64, Ordering};

/// Internal counters, updated with relaxed atomics on the hot paths.
#[derive(Default)]
pub(crate) struct StoreStats {
    pub tasks_executed: AtomicU64,
    pub updates_committed: AtomicU64,
    pub fast_track_hits: AtomicU64,
    pub fallbacks_installed: AtomicU64,
    pub cells_collapsed: AtomicU64,
}

impl StoreStats {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StoreStatistics {
        StoreStatistics {
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            updates_committed: self.updates_committed.load(Ordering::Relaxed),
            fast_track_hits: self.fast_track_hits.load(Ordering::Relaxed),
            fallbacks_installed: self.fallbacks_installed.load(Ordering::Relaxed),
            cells_collapsed: self.cells_collapsed.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of the store's execution counters.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Tasks executed by the scheduler (analyses, lazy/triggered computations,
    /// continuations).
    pub tasks_executed: u64,
    /// Cell transitions committed.
    pub updates_committed: u64,
    /// Queries answered synchronously by a fast-track hook.
    pub fast_track_hits: u64,
    /// Fallback values installed at phase completion.
    pub fallbacks_installed: u64,
    /// Cells finalized at their upper bound by cycle collapse.
    pub cells_collapsed: u64,
}
