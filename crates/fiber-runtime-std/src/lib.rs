//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform
//! abstraction traits defined in `fiber-core`. Applications construct a
//! [`StdRuntime`], build their [`Engine`] with [`StdRuntime::runtime`], and
//! call [`StdRuntime::pump`] from their event loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use fiber_core::{
    Deadline, Engine, EngineError, Host, IdleScheduler, Runtime, RuntimeHandle, SliceOutcome,
};

type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that records slice requests in an atomic flag.
///
/// The engine and its runtime are `Rc`-based and stay on one thread, but
/// [`IdleScheduler`] is `Send + Sync`: the waker is how an event loop on
/// another thread learns that a slice is due. The flag is only taken by
/// the thread that owns the engine.
pub struct StdScheduler {
    slice_requested: AtomicBool,
    slice_waker: RwLock<Option<Waker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            slice_requested: AtomicBool::new(false),
            slice_waker: RwLock::new(None),
        }
    }

    /// Returns whether a slice has been requested since the last call.
    pub fn take_slice_request(&self) -> bool {
        self.slice_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker that will be invoked whenever a new slice is requested.
    pub fn set_slice_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self
            .slice_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    /// Clears any registered slice waker.
    pub fn clear_slice_waker(&self) {
        *self
            .slice_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .slice_waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field(
                "slice_requested",
                &self.slice_requested.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl IdleScheduler for StdScheduler {
    fn request_idle_slice(&self) {
        self.slice_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Wall-clock deadline for one slice.
#[derive(Debug, Clone, Copy)]
pub struct InstantDeadline {
    end: Instant,
}

impl InstantDeadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
        }
    }
}

impl Deadline for InstantDeadline {
    fn time_remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }
}

/// Driver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdRuntimeOptions {
    slice: Duration,
    max_slices: usize,
}

impl Default for StdRuntimeOptions {
    fn default() -> Self {
        Self {
            slice: Duration::from_millis(16),
            max_slices: 10_000,
        }
    }
}

impl StdRuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Budget of each slice handed to the work loop.
    pub fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice;
        self
    }

    /// Upper bound on slices run by [`StdRuntime::run_until_settled`].
    pub fn with_max_slices(mut self, max_slices: usize) -> Self {
        self.max_slices = max_slices;
        self
    }

    pub fn slice(&self) -> Duration {
        self.slice
    }

    pub fn max_slices(&self) -> usize {
        self.max_slices
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    Engine(EngineError),
    /// Work was still pending after the configured number of slices.
    Unsettled { slices: usize },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Engine(err) => write!(f, "engine error: {err}"),
            DriverError::Unsettled { slices } => {
                write!(f, "engine still busy after {slices} slices")
            }
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Engine(err) => Some(err),
            DriverError::Unsettled { .. } => None,
        }
    }
}

impl From<EngineError> for DriverError {
    fn from(err: EngineError) -> Self {
        DriverError::Engine(err)
    }
}

/// Convenience container bundling the standard scheduler and a runtime.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    runtime: Runtime,
    options: StdRuntimeOptions,
}

impl StdRuntime {
    pub fn new() -> Self {
        Self::with_options(StdRuntimeOptions::default())
    }

    pub fn with_options(options: StdRuntimeOptions) -> Self {
        let scheduler = Arc::new(StdScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        Self {
            scheduler,
            runtime,
            options,
        }
    }

    /// Returns a [`fiber_core::Runtime`] configured with the standard scheduler.
    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn options(&self) -> &StdRuntimeOptions {
        &self.options
    }

    /// Returns whether a slice was requested since the last poll.
    pub fn take_slice_request(&self) -> bool {
        self.scheduler.take_slice_request()
    }

    pub fn set_slice_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_slice_waker(waker);
    }

    pub fn clear_slice_waker(&self) {
        self.scheduler.clear_slice_waker();
    }

    /// Runs one slice if the engine asked for one.
    pub fn pump<H: Host>(
        &self,
        engine: &mut Engine<H>,
    ) -> Result<Option<SliceOutcome>, DriverError> {
        if !self.take_slice_request() {
            return Ok(None);
        }
        self.run_slice(engine).map(Some)
    }

    /// Runs slices until the engine has nothing in flight and nothing requested.
    ///
    /// Returns the number of slices run.
    pub fn run_until_settled<H: Host>(
        &self,
        engine: &mut Engine<H>,
    ) -> Result<usize, DriverError> {
        let mut slices = 0;
        while engine.has_pending_work() {
            if slices >= self.options.max_slices {
                return Err(DriverError::Unsettled { slices });
            }
            self.take_slice_request();
            self.run_slice(engine)?;
            slices += 1;
        }
        Ok(slices)
    }

    fn run_slice<H: Host>(&self, engine: &mut Engine<H>) -> Result<SliceOutcome, DriverError> {
        let deadline = InstantDeadline::after(self.options.slice);
        match engine.work_loop(&deadline) {
            Ok(outcome) => {
                if let SliceOutcome::Committed { units } = outcome {
                    log::debug!("slice committed after {units} units");
                }
                Ok(outcome)
            }
            Err(err) => {
                log::error!("slice failed: {err}");
                Err(err.into())
            }
        }
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("options", &self.options)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}
