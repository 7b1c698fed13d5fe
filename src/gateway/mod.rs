//! Conversational Query Gateway
//!
//! One `ask` drives a question through an explicit state machine:
//!
//! ```text
//! Received ──translate──▶ Translated ──execute──▶ Executed ──format──▶ Completed
//!    │                        │   ▲
//!    │                        │   └─ timeout: one retry with degraded limits
//!    └────────────────────────┴──────────────▶ Failed
//! ```
//!
//! Every path ends with exactly one turn appended to the session history,
//! and the session's history lock is held from arrival until that append.
//! The lock is FIFO, so turns land in the order requests arrived.

pub mod format;

pub use format::format_answer;

use crate::completion::CompletionClient;
use crate::config::Config;
use crate::error::GatewayError;
use crate::executor::{Deadline, ExecutionLimits, QueryExecutor};
use crate::schema::SchemaCatalog;
use crate::session::{Session, SessionHistory, Turn};
use crate::translator::Translator;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// Per-request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Translated,
    Executed,
    Failed,
    Completed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Failed | RequestState::Completed)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RequestState::Received => "received",
            RequestState::Translated => "translated",
            RequestState::Executed => "executed",
            RequestState::Failed => "failed",
            RequestState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Request counters since startup
#[derive(Debug, Default)]
pub struct GatewayStats {
    asked: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub asked: u64,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
}

impl GatewayStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            asked: self.asked.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

pub struct Gateway {
    catalog: Arc<SchemaCatalog>,
    translator: Translator,
    executor: QueryExecutor,
    limits: ExecutionLimits,
    retry_limits: ExecutionLimits,
    total_timeout: Duration,
    max_question_bytes: usize,
    stats: GatewayStats,
}

impl Gateway {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        client: Arc<dyn CompletionClient>,
        executor: QueryExecutor,
        config: &Config,
    ) -> Self {
        Gateway {
            catalog,
            translator: Translator::new(client, config.completion.timeout()),
            executor,
            limits: ExecutionLimits::from_config(&config.execution),
            retry_limits: ExecutionLimits::degraded_from_config(&config.execution),
            total_timeout: config.gateway.total_timeout(),
            max_question_bytes: config.gateway.max_question_bytes,
            stats: GatewayStats::default(),
        }
    }

    /// Build the catalog and executor from configuration.
    ///
    /// Fails with `GatewayError::Config` if the bounds are invalid or the
    /// database cannot be opened.
    pub fn from_config(
        config: &Config,
        client: Arc<dyn CompletionClient>,
    ) -> Result<Self, GatewayError> {
        config.validate_bounds()?;
        let catalog = Arc::new(SchemaCatalog::forensics()?);
        let executor = QueryExecutor::open(&config.database.path, config.database.pool_size)?;
        Ok(Gateway::new(catalog, client, executor, config))
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn completion_client(&self) -> &str {
        self.translator.client_name()
    }

    /// Answer a question within a session.
    ///
    /// Never fails: every error becomes an error turn with a sanitized
    /// message. The returned turn is the one appended to the history.
    pub async fn ask(&self, session: &Session, question: &str) -> Turn {
        let history = session.lock_history().await;
        self.ask_locked(session, history, question).await
    }

    /// [`Gateway::ask`] for a request that already holds the session's
    /// history lock. The turn is appended through `history`.
    pub async fn ask_locked(
        &self,
        session: &Session,
        mut history: OwnedMutexGuard<SessionHistory>,
        question: &str,
    ) -> Turn {
        self.stats.asked.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            session_id = %session.id,
            turn = history.len() + 1,
            question_bytes = question.len(),
            "ask_received"
        );

        // The budget starts once this request holds the session
        let deadline = Deadline::new(self.total_timeout);
        let outcome =
            match tokio::time::timeout(self.total_timeout, self.answer(session, question, deadline))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(GatewayError::Timeout(deadline.to_error())),
            };

        let turn = match outcome {
            Ok(answer) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                log_state(session, RequestState::Completed);
                tracing::info!(
                    session_id = %session.id,
                    elapsed_ms = deadline.elapsed().as_millis() as u64,
                    "ask_completed"
                );
                Turn::ok(question, answer)
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                log_state(session, RequestState::Failed);
                log_failure(session, &e);
                Turn::error(question, e.user_message(), e.kind())
            }
        };

        history.append(turn.clone());
        session.touch();
        turn
    }

    async fn answer(
        &self,
        session: &Session,
        question: &str,
        deadline: Deadline,
    ) -> Result<String, GatewayError> {
        log_state(session, RequestState::Received);
        self.check_question(question)?;

        let plan = self
            .translator
            .translate_within(question, &self.catalog, deadline.remaining())
            .await?;
        log_state(session, RequestState::Translated);
        tracing::debug!(
            session_id = %session.id,
            statement = %plan.generated_statement,
            tables = ?plan.referenced_tables,
            "plan_ready"
        );

        deadline.check()?;
        let limits = self.limits.with_timeout_at_most(deadline.remaining());
        let result = match self.executor.execute(&plan, limits).await {
            Err(e) if e.is_transient() => {
                deadline.check()?;
                self.stats.retries.fetch_add(1, Ordering::Relaxed);
                let retry = self.retry_limits.with_timeout_at_most(deadline.remaining());
                tracing::warn!(
                    session_id = %session.id,
                    max_rows = retry.max_rows,
                    timeout_ms = retry.timeout.as_millis() as u64,
                    "execution_retry"
                );
                self.executor.execute(&plan, retry).await?
            }
            other => other?,
        };
        log_state(session, RequestState::Executed);

        Ok(format_answer(&result))
    }

    fn check_question(&self, question: &str) -> Result<(), GatewayError> {
        if question.trim().is_empty() {
            return Err(GatewayError::Translation("question is empty".to_string()));
        }
        if question.len() > self.max_question_bytes {
            return Err(GatewayError::Translation(format!(
                "question is {} bytes, limit is {}",
                question.len(),
                self.max_question_bytes
            )));
        }
        Ok(())
    }
}

fn log_state(session: &Session, state: RequestState) {
    tracing::debug!(session_id = %session.id, state = %state, terminal = state.is_terminal(), "request_state");
}

fn log_failure(session: &Session, error: &GatewayError) {
    match error {
        GatewayError::UnsafeQuery { reason, statement } => {
            tracing::warn!(session_id = %session.id, %reason, %statement, "unsafe_query_rejected");
        }
        GatewayError::Execution(detail) => {
            tracing::error!(session_id = %session.id, %detail, "execution_failed");
        }
        other => {
            tracing::warn!(session_id = %session.id, kind = other.kind(), error = %other, "ask_failed");
        }
    }
}
