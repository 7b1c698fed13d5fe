//! Execution Limits
//!
//! Row cap and statement timeout applied at the executor boundary, plus the
//! degraded pair used for the single retry after a timeout.

use crate::config::ExecutionConfig;
use std::time::Duration;

/// Bounds for one statement execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Rows returned at most; anything beyond sets `truncated`
    pub max_rows: usize,
    /// Wall-clock bound on the statement
    pub timeout: Duration,
}

impl ExecutionLimits {
    pub fn new(max_rows: usize, timeout: Duration) -> Self {
        ExecutionLimits { max_rows, timeout }
    }

    /// Primary limits from configuration
    pub fn from_config(config: &ExecutionConfig) -> Self {
        ExecutionLimits::new(config.max_rows, config.timeout())
    }

    /// Reduced limits for the retry after a timeout
    pub fn degraded_from_config(config: &ExecutionConfig) -> Self {
        ExecutionLimits::new(config.retry_max_rows, config.retry_timeout())
    }

    /// Same row cap, timeout clamped to at most `timeout`
    pub fn with_timeout_at_most(self, timeout: Duration) -> Self {
        ExecutionLimits {
            timeout: self.timeout.min(timeout),
            ..self
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits::from_config(&ExecutionConfig::default())
    }
}
