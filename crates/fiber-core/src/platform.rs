//! Platform abstraction traits for the engine's cooperative scheduling.
//!
//! The engine never blocks or sleeps. It asks the host environment for an
//! idle slice and, when the driver invokes it, works until the supplied
//! [`Deadline`] says the slice is spent.

use std::time::Duration;

/// Idle-time callback primitive of the host environment.
///
/// Implementations record the request and arrange for the driver to call
/// [`Engine::work_loop`](crate::Engine::work_loop) at some later point.
pub trait IdleScheduler: Send + Sync {
    /// Request that the host grant the engine another idle slice.
    fn request_idle_slice(&self);
}

/// Remaining budget of the current idle slice.
pub trait Deadline {
    fn time_remaining(&self) -> Duration;
}

/// A deadline with a fixed budget, useful when the driver has no clock.
#[derive(Debug, Clone, Copy)]
pub struct FixedDeadline(pub Duration);

impl Deadline for FixedDeadline {
    fn time_remaining(&self) -> Duration {
        self.0
    }
}

