use std::time::Duration;

/// Tuning knobs for the work loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    min_time_remaining: Duration,
    max_units_per_slice: Option<usize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            min_time_remaining: Duration::from_millis(1),
            max_units_per_slice: None,
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The loop yields once the slice has less than this left.
    pub fn with_min_time_remaining(mut self, min: Duration) -> Self {
        self.min_time_remaining = min;
        self
    }

    /// Caps the units of work performed in one slice regardless of the deadline.
    ///
    /// A cap of zero is treated as one; every slice makes progress.
    pub fn with_max_units_per_slice(mut self, max: usize) -> Self {
        self.max_units_per_slice = Some(max.max(1));
        self
    }

    pub fn min_time_remaining(&self) -> Duration {
        self.min_time_remaining
    }

    pub fn max_units_per_slice(&self) -> Option<usize> {
        self.max_units_per_slice
    }
}
