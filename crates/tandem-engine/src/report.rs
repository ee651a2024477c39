//! Per-tick execution reports.

use tandem_capture::CommandError;
use tandem_core::{ScopeId, TickId};

/// What happened while simulating one tick of one scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Scope simulated.
    pub scope: ScopeId,
    /// Tick simulated.
    pub tick: TickId,
    /// Commands whose handler ran.
    pub executed: usize,
    /// Commands deliberately not run (absent target, cancel conditions).
    pub skipped: usize,
    /// Commands that failed to decode, were rejected, or panicked.
    pub failed: usize,
    /// Commands stamped for an earlier tick.
    pub stale: usize,
    /// The failures, in execution order.
    pub failures: Vec<CommandError>,
}

impl TickReport {
    pub(crate) fn new(scope: ScopeId, tick: TickId) -> Self {
        Self {
            scope,
            tick,
            executed: 0,
            skipped: 0,
            failed: 0,
            stale: 0,
            failures: Vec::new(),
        }
    }

    /// Commands taken from the queue for this tick.
    pub fn total(&self) -> usize {
        self.executed + self.skipped + self.failed
    }
}

/// Result of replaying a journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Every recorded state was reproduced.
    Matched {
        /// Frames replayed.
        frames: u64,
    },
    /// A recorded state was not reproduced.
    Diverged {
        /// Tick of the first mismatching frame.
        tick: TickId,
        /// Frames that matched before it.
        frames: u64,
    },
}
