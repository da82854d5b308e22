//! The cooperative work loop driven by host idle slices.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::host::Host;
use crate::platform::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceOutcome {
    /// Nothing was in flight and nothing was requested.
    Idle,
    /// The deadline ran out with units of work left; the next slice resumes.
    Suspended { units: usize },
    /// The pass finished in this slice and was committed.
    Committed { units: usize },
}

impl SliceOutcome {
    pub fn units(&self) -> usize {
        match self {
            SliceOutcome::Idle => 0,
            SliceOutcome::Suspended { units } | SliceOutcome::Committed { units } => *units,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, SliceOutcome::Committed { .. })
    }
}

impl<H: Host> Engine<H> {
    /// Runs one idle slice.
    ///
    /// Performs units of work until the deadline is nearly spent, commits
    /// when the pass runs out of work, and always asks the scheduler for
    /// another slice before returning. A failed slice abandons the pass in
    /// flight; the committed tree stays current.
    pub fn work_loop(&mut self, deadline: &dyn Deadline) -> Result<SliceOutcome, EngineError> {
        let outcome = self.run_slice(deadline);
        if let Err(err) = &outcome {
            log::debug!("slice failed: {err}");
            self.abandon_in_flight();
        }
        self.runtime.request_idle_slice();
        outcome
    }

    fn run_slice(&mut self, deadline: &dyn Deadline) -> Result<SliceOutcome, EngineError> {
        let min_remaining = self.options.min_time_remaining();
        let max_units = self.options.max_units_per_slice();
        let mut units = 0;
        let mut should_yield = false;

        loop {
            // A state update since the last unit invalidates the pass.
            if self.runtime.take_render_request() {
                self.restart_from_current();
            }
            let Some(unit) = self.next_unit else {
                break;
            };
            if should_yield {
                log::trace!("yielding after {units} units; next is {unit}");
                return Ok(SliceOutcome::Suspended { units });
            }
            self.next_unit = self.perform_unit_of_work(unit)?;
            units += 1;
            should_yield = deadline.time_remaining() < min_remaining
                || max_units.is_some_and(|max| units >= max);
        }

        if self.wip_root.is_some() {
            self.commit_root()?;
            return Ok(SliceOutcome::Committed { units });
        }
        Ok(SliceOutcome::Idle)
    }
}
