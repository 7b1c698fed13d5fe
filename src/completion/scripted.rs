//! Scripted completion client: replays canned responses in order. Used for
//! tests and offline demos where no model is available.

use super::{CompletionClient, CompletionError, CompletionRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    /// Returned once the script runs dry
    fallback: Option<String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    /// Answer every request with the same text
    pub fn always(response: impl Into<String>) -> Self {
        ScriptedCompletion {
            fallback: Some(response.into()),
            ..Default::default()
        }
    }

    /// Answer requests with these results in order, then fail
    pub fn sequence(responses: Vec<Result<String, CompletionError>>) -> Self {
        ScriptedCompletion {
            script: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    /// Sleep before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests received so far
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(result) => result,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| CompletionError::Unavailable("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user: &str) -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            user: user.to_string(),
        }
    }

    #[tokio::test]
    async fn test_sequence_then_exhausted() {
        let client = ScriptedCompletion::sequence(vec![
            Ok("SELECT 1".to_string()),
            Err(CompletionError::Http("500".to_string())),
        ]);
        assert_eq!(client.complete(&request("a")).await.unwrap(), "SELECT 1");
        assert!(matches!(
            client.complete(&request("b")).await,
            Err(CompletionError::Http(_))
        ));
        assert!(matches!(
            client.complete(&request("c")).await,
            Err(CompletionError::Unavailable(_))
        ));
        assert_eq!(client.calls(), 3);
        assert_eq!(client.requests()[1].user, "b");
    }

    #[tokio::test]
    async fn test_always_repeats() {
        let client = ScriptedCompletion::always("SELECT 2");
        for _ in 0..3 {
            assert_eq!(client.complete(&request("q")).await.unwrap(), "SELECT 2");
        }
    }
}
