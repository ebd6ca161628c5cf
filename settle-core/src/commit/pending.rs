//! An armed debounce timer.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A timer waiting to fire a commit.
///
/// Owned by the scheduler state. Exactly one is armed at a time; arming a
/// new one cancels the previous.
#[derive(Debug)]
pub struct PendingCommit {
    handle: JoinHandle<()>,
    armed_at: Instant,
    generation: u64,
}

impl PendingCommit {
    pub fn new(handle: JoinHandle<()>, generation: u64) -> Self {
        Self {
            handle,
            armed_at: Instant::now(),
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn armed_at(&self) -> Instant {
        self.armed_at
    }

    /// Time since the timer was armed.
    pub fn elapsed(&self) -> Duration {
        self.armed_at.elapsed()
    }

    /// Abort the timer. A timer that already fired is unaffected.
    pub fn cancel(self) {
        self.handle.abort();
    }
}
