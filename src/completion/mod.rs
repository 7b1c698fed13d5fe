//! Completion Service Boundary
//!
//! The language model is an external, untrusted collaborator reached through
//! one narrow call: a system context plus a user message in, free text out.
//! Nothing returned here is trusted; the translator validates it.

mod openai;
mod scripted;

pub use openai::OpenAiClient;
pub use scripted::ScriptedCompletion;

use async_trait::async_trait;
use std::time::Duration;

/// Errors from completion calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    /// Service could not be reached
    #[error("Completion service unavailable: {0}")]
    Unavailable(String),

    /// Service answered with an error status
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body was not in the expected shape
    #[error("Malformed completion response: {0}")]
    Parse(String),

    #[error("Completion call exceeded {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Unavailable(format!("request timed out: {e}"))
        } else {
            CompletionError::Http(e.to_string())
        }
    }
}

/// One outbound completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Grounding context and output restrictions
    pub system: String,
    /// The question as asked
    pub user: String,
}

/// A service that turns a prompt into free text.
///
/// Implementations must be stateless across calls so one client can be
/// shared by every session.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Human-readable client name (e.g. "openai")
    fn name(&self) -> &str;
}
