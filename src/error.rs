//! Gateway Error Types
//!
//! One taxonomy for every failure a request can hit. Only `Config` is fatal,
//! and only at startup; everything else is caught at the gateway boundary and
//! turned into an error turn carrying [`GatewayError::user_message`].

use crate::completion::CompletionError;
use crate::executor::TimeoutError;

/// Gateway errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Misconfiguration detected at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model output could not be turned into a single statement
    #[error("Translation error: {0}")]
    Translation(String),

    /// Statement mutates data or reaches outside the catalog
    #[error("Unsafe query rejected: {reason}")]
    UnsafeQuery {
        reason: String,
        /// Offending statement, kept for logs only
        statement: String,
    },

    /// Store-level failure while running a statement
    #[error("Execution error: {0}")]
    Execution(String),

    /// Statement or request exceeded its time bound
    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    /// Completion service failed or was unreachable
    #[error("Completion service error: {0}")]
    Completion(#[from] CompletionError),
}

impl GatewayError {
    pub fn unsafe_query(reason: impl Into<String>, statement: impl Into<String>) -> Self {
        GatewayError::UnsafeQuery {
            reason: reason.into(),
            statement: statement.into(),
        }
    }

    /// Stable machine-readable kind, used in logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "config",
            GatewayError::Translation(_) => "translation",
            GatewayError::UnsafeQuery { .. } => "unsafe_query",
            GatewayError::Execution(_) => "execution",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Completion(_) => "completion",
        }
    }

    /// Only statement timeouts are worth a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }

    /// Sanitized text shown to the person asking. Never includes error detail
    /// or statement text.
    pub fn user_message(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "The assistant is not configured correctly.",
            GatewayError::Translation(_) => {
                "I couldn't turn that into a question about the forensics data. \
                 Could you rephrase it?"
            }
            GatewayError::UnsafeQuery { .. } => {
                "I can only read the forensics data, so that request was refused."
            }
            GatewayError::Execution(_) => {
                "Something went wrong while looking that up. Please try again."
            }
            GatewayError::Timeout(_) => {
                "That question took too long to answer. Try narrowing it down."
            }
            GatewayError::Completion(_) => {
                "The language service is unavailable right now. Please try again shortly."
            }
        }
    }
}

impl From<figment::Error> for GatewayError {
    fn from(err: figment::Error) -> Self {
        GatewayError::Config(err.to_string())
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_only_timeout_is_transient() {
        let timeout = GatewayError::Timeout(TimeoutError {
            timeout: Duration::from_secs(1),
            elapsed: Duration::from_secs(2),
        });
        assert!(timeout.is_transient());
        assert!(!GatewayError::Execution("disk I/O error".to_string()).is_transient());
        assert!(!GatewayError::Translation("empty".to_string()).is_transient());
        assert!(!GatewayError::unsafe_query("drop", "DROP TABLE x").is_transient());
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = GatewayError::unsafe_query(
            "mutating statement",
            "DROP TABLE investigation",
        );
        assert!(!err.user_message().contains("DROP"));
        assert!(err.to_string().contains("mutating statement"));

        let err = GatewayError::Execution("no such column: secret_col".to_string());
        assert!(!err.user_message().contains("secret_col"));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(GatewayError::Config(String::new()).kind(), "config");
        assert_eq!(GatewayError::Translation(String::new()).kind(), "translation");
        assert_eq!(
            GatewayError::Completion(CompletionError::Unavailable("x".to_string())).kind(),
            "completion"
        );
    }
}
