//! OpenAI-compatible chat completion client (configurable base URL, so any
//! service speaking the same API works).

use super::{CompletionClient, CompletionError, CompletionRequest};
use crate::config::CompletionConfig;
use crate::error::GatewayError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        if api_key.trim().is_empty() {
            return Err(GatewayError::Config(
                "completion API key is not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &CompletionConfig) -> Result<Self, GatewayError> {
        Self::new(
            &config.api_key,
            &config.model,
            &config.base_url,
            Duration::from_millis(config.timeout_ms),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_body(&self, request: &CompletionRequest) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": 0.0
        })
    }

    pub fn parse_response(json: &Value) -> Result<String, CompletionError> {
        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| CompletionError::Parse("missing choices[0].message.content".to_string()))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| CompletionError::Unavailable(format!("openai: {e}")))?
            .error_for_status()?;

        let json: Value = resp.json().await?;
        Self::parse_response(&json)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
