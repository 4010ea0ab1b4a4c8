//! Absolute-deadline frame pacing.
//!
//! The next frame is due at a fixed point in time; every step moves that
//! point forward by exactly one frame interval instead of sleeping a fixed
//! period after the previous frame, so scheduling latency never accumulates
//! into drift.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Makes the first frame due at `now`.
    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    pub fn reset(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next_due
    }

    /// A frame went out; the next one is due one interval later, plus `corrective`.
    pub fn advance(&mut self, corrective: Option<Duration>) {
        if let Some(due) = self.next_due.as_mut() {
            *due += self.interval + corrective.unwrap_or_default();
        }
    }

    /// Nothing to send; look again after `retry`.
    pub fn defer(&mut self, now: Instant, retry: Duration) {
        if self.next_due.is_some() {
            self.next_due = Some(now + retry);
        }
    }
}
