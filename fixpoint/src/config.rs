use core::num::NonZeroUsize;

/// Which execution model drives the store's work queue.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Tasks run to completion, one at a time, in the thread that calls
    /// [wait_on_phase_completion](crate::PropertyStore::wait_on_phase_completion).
    /// This is the reference model.
    #[default]
    Sequential,
    /// A fixed pool of workers drains the queue; continuations enqueued by one
    /// worker may run on any worker.
    Parallel(NonZeroUsize),
}

/// How continuations are dispatched when a dependee updates.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum DependeeUpdateHandling {
    /// Continuations are placed at the head of the queue and run before any
    /// previously scheduled work.
    #[default]
    Eager,
    /// Continuations are queued behind other work; final and/or non-final
    /// notifications can additionally be delayed until the main queue drains.
    Lazy {
        delay_final: bool,
        delay_non_final: bool,
    },
}

/// Configuration for a property store instance, consumed at construction.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    execution: ExecutionMode,
    dependee_update_handling: DependeeUpdateHandling,
    delay_depender_notification: bool,
    use_fast_track: bool,
    debug: bool,
    suppress_error: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::default(),
            dependee_update_handling: DependeeUpdateHandling::default(),
            delay_depender_notification: false,
            use_fast_track: true,
            debug: cfg!(debug_assertions),
            suppress_error: false,
        }
    }
}

impl StoreConfig {
    /// Get a new, default configuration
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A default configuration using `workers` parallel workers.
    pub fn parallel(workers: NonZeroUsize) -> Self {
        let mut config = Self::default();
        config.set_execution(ExecutionMode::Parallel(workers));
        config
    }

    #[inline(always)]
    pub const fn execution(&self) -> ExecutionMode {
        self.execution
    }

    #[inline(always)]
    pub const fn dependee_update_handling(&self) -> DependeeUpdateHandling {
        self.dependee_update_handling
    }

    #[inline(always)]
    pub const fn delay_depender_notification(&self) -> bool {
        self.delay_depender_notification
    }

    #[inline(always)]
    pub const fn use_fast_track(&self) -> bool {
        self.use_fast_track
    }

    /// Whether monotonicity violations are surfaced as
    /// [BadUpdate](crate::StoreError::BadUpdate) rather than clamped.
    #[inline(always)]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    #[inline(always)]
    pub const fn suppress_error(&self) -> bool {
        self.suppress_error
    }

    pub fn set_execution(&mut self, execution: ExecutionMode) -> &mut Self {
        self.execution = execution;
        self
    }

    pub fn set_dependee_update_handling(
        &mut self,
        handling: DependeeUpdateHandling,
    ) -> &mut Self {
        self.dependee_update_handling = handling;
        self
    }

    /// Batch depender notifications and release them only once the main queue
    /// has drained.
    pub fn set_delay_depender_notification(&mut self, yes: bool) -> &mut Self {
        self.delay_depender_notification = yes;
        self
    }

    /// Consult a kind's fast-track hook before scheduling a lazy computation.
    pub fn set_use_fast_track(&mut self, yes: bool) -> &mut Self {
        self.use_fast_track = yes;
        self
    }

    /// Enable interval checks; violations become errors instead of being
    /// silently clamped.
    pub fn set_debug(&mut self, yes: bool) -> &mut Self {
        self.debug = yes;
        self
    }

    /// Downgrade recoverable errors to log output.
    pub fn set_suppress_error(&mut self, yes: bool) -> &mut Self {
        self.suppress_error = yes;
        self
    }
}
