//! Request Deadline Module
//!
//! A request carries one overall time budget. Each stage asks the deadline
//! how much of it is left and clamps its own bound to that, so the sum of
//! stages can never outlive the request.

use std::time::{Duration, Instant};

/// Timeout error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("exceeded timeout of {timeout:?} (ran for {elapsed:?})")]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub timeout: Duration,
    /// How long the operation actually ran
    pub elapsed: Duration,
}

/// Overall time budget for one request
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start_time: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a deadline that expires `budget` from now
    pub fn new(budget: Duration) -> Self {
        Deadline {
            start_time: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time left before the deadline, zero once passed
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.start_time.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Ok while time remains, otherwise the timeout error to surface
    pub fn check(&self) -> Result<(), TimeoutError> {
        if self.is_expired() {
            Err(self.to_error())
        } else {
            Ok(())
        }
    }

    /// Clamp a stage bound to what is left of the budget
    pub fn bound(&self, stage: Duration) -> Duration {
        stage.min(self.remaining())
    }

    pub fn to_error(&self) -> TimeoutError {
        TimeoutError {
            timeout: self.budget,
            elapsed: self.elapsed(),
        }
    }
}
