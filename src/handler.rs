//! Handler for the forensic assistant
//!
//! Shared state behind the HTTP API and the terminal chat: one gateway and
//! the session table. Cheap to share as `Arc<Handler>`.

use crate::completion::{CompletionClient, OpenAiClient};
use crate::error::GatewayError;
use crate::gateway::{Gateway, StatsSnapshot};
use crate::session::{SessionError, SessionId, SessionManager, Turn};
use crate::Config;
use std::sync::Arc;
use std::time::Instant;

pub struct Handler {
    gateway: Arc<Gateway>,
    sessions: SessionManager,
    start_time: Instant,
}

impl Handler {
    pub fn new(gateway: Gateway, sessions: SessionManager) -> Self {
        Self {
            gateway: Arc::new(gateway),
            sessions,
            start_time: Instant::now(),
        }
    }

    /// Build everything from configuration using the OpenAI-compatible client.
    ///
    /// Requires a completion credential; see [`Config::validate`].
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        config.validate()?;
        let client = Arc::new(OpenAiClient::from_config(&config.completion)?);
        Self::with_client(config, client)
    }

    /// Build with a caller-supplied completion client
    pub fn with_client(
        config: &Config,
        client: Arc<dyn CompletionClient>,
    ) -> Result<Self, GatewayError> {
        let gateway = Gateway::from_config(config, client)?;
        Ok(Self::new(gateway, SessionManager::new(config.session.clone())))
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.gateway.stats()
    }

    pub fn create_session(&self) -> Result<SessionId, SessionError> {
        Ok(self.sessions.create_session()?.id.clone())
    }

    pub fn close_session(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.close_session(id)
    }

    /// Ask within a session.
    ///
    /// The session's history lock is taken here, so requests are served in
    /// the order they reach this call. Once the lock is held the ask moves to
    /// its own task and the turn is recorded even if the caller goes away.
    /// A caller that goes away while still queued leaves no turn.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<Turn, SessionError> {
        let session = self.sessions.get(session_id)?;
        let history = session.lock_history().await;
        let gateway = Arc::clone(&self.gateway);
        let owned = question.to_string();
        let task =
            tokio::spawn(async move { gateway.ask_locked(&session, history, &owned).await });
        match task.await {
            Ok(turn) => Ok(turn),
            Err(e) => {
                // Not recorded in the history: the ask never reached its append
                tracing::error!(session_id, error = %e, "ask_task_failed");
                let failure = GatewayError::Execution(e.to_string());
                Ok(Turn::error(question, failure.user_message(), failure.kind()))
            }
        }
    }

    pub async fn last_turn(&self, session_id: &str) -> Result<Option<Turn>, SessionError> {
        let session = self.sessions.get(session_id)?;
        Ok(session.last_turn().await)
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>, SessionError> {
        let session = self.sessions.get(session_id)?;
        Ok(session.turns().await)
    }
}
