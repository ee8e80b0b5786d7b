//! Timer components for the single-threaded event loop.
//!
//! Nothing here sleeps or spawns. The host passes `now` into [`Debounce::poll`]
//! and [`Interval::poll`] from its tick, and runs the action when they
//! report a firing.

use std::time::{Duration, Instant};

/// Fires once after `delay` has elapsed with no further `schedule` call.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// (Re)starts the quiet period.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns true exactly once when the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Cancels the timer, reporting whether a firing was still pending so the
    /// caller can run it one last time.
    pub fn flush_on_teardown(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// Fires every `period` until cancelled.
#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    next: Option<Instant>,
}

impl Interval {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// Starts (or restarts) counting a full period from `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.next = Some(now + self.period);
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if now >= next => {
                self.next = Some(now + self.period);
                true
            }
            _ => false,
        }
    }

    pub fn flush_on_teardown(&mut self) -> bool {
        self.next.take().is_some()
    }
}
