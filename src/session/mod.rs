//! Session Manager
//!
//! Sessions isolate conversation history. Each session owns its own
//! [`SessionHistory`]; the only things shared between sessions are the
//! read-only store and the completion client held by the gateway.
//!
//! ```text
//! SessionManager
//! ├── Sessions (HashMap<SessionId, Arc<Session>>)
//! │   └── Session
//! │       ├── History (FIFO async mutex, held for a whole ask)
//! │       └── Created/accessed timestamps
//! └── Config (max sessions, idle timeout)
//! ```
//!
//! The history mutex is a `tokio::sync::Mutex`, which grants the lock in
//! request order. Holding it for the duration of an ask is what makes
//! turns land in arrival order.

mod history;

pub use history::{SessionHistory, Turn, TurnStatus};

use crate::config::SessionConfig;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Unique session identifier (random UUID)
pub type SessionId = String;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(SessionId),

    #[error("Maximum number of sessions ({0}) exceeded")]
    LimitReached(usize),
}

/// One conversation
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    last_accessed: Mutex<Instant>,
    history: Arc<tokio::sync::Mutex<SessionHistory>>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Session {
            id,
            created_at: Utc::now(),
            last_accessed: Mutex::new(Instant::now()),
            history: Arc::new(tokio::sync::Mutex::new(SessionHistory::new())),
        }
    }

    /// Update last-accessed time to prevent idle reaping
    pub fn touch(&self) {
        *self.last_accessed.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_accessed.lock().elapsed()
    }

    /// Exclusive access to the history, granted in request order.
    ///
    /// The guard is owned so it can be handed to another task while the
    /// request keeps its place.
    pub async fn lock_history(&self) -> tokio::sync::OwnedMutexGuard<SessionHistory> {
        Arc::clone(&self.history).lock_owned().await
    }

    /// Most recent turn, waiting for any in-flight ask to finish
    pub async fn last_turn(&self) -> Option<Turn> {
        self.history.lock().await.last().cloned()
    }

    /// Copy of every turn, oldest first
    pub async fn turns(&self) -> Vec<Turn> {
        self.history.lock().await.all().to_vec()
    }
}

/// Manages all active sessions
///
/// Thread-safe via internal RwLock. Sessions are identified by random
/// UUIDs to prevent enumeration.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a new, empty session
    pub fn create_session(&self) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.write();

        if self.config.max_sessions > 0 && sessions.len() >= self.config.max_sessions {
            return Err(SessionError::LimitReached(self.config.max_sessions));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone()));
        sessions.insert(id.clone(), Arc::clone(&session));
        tracing::info!(session_id = %id, active = sessions.len(), "session_created");
        Ok(session)
    }

    /// Close a session. In-flight asks holding the session finish normally.
    pub fn close_session(&self, id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        tracing::info!(session_id = %id, "session_closed");
        Ok(())
    }

    /// Look up a session and mark it active
    pub fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        let session = self
            .sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.touch();
        Ok(session)
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove sessions idle longer than the configured timeout.
    ///
    /// Returns the number of sessions reaped.
    pub fn reap_expired(&self) -> usize {
        if self.config.idle_timeout_secs == 0 {
            return 0;
        }
        self.reap_idle_longer_than(Duration::from_secs(self.config.idle_timeout_secs))
    }

    pub fn reap_idle_longer_than(&self, timeout: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for() < timeout);
        let reaped = before - sessions.len();
        drop(sessions);

        if reaped > 0 {
            tracing::info!(count = reaped, "sessions_reaped");
        }
        reaped
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_sessions: usize) -> SessionManager {
        SessionManager::new(SessionConfig {
            max_sessions,
            idle_timeout_secs: 3600,
        })
    }

    #[test]
    fn test_create_and_close() {
        let mgr = SessionManager::default();
        let session = mgr.create_session().unwrap();
        assert!(mgr.has_session(&session.id));
        assert_eq!(mgr.session_count(), 1);

        mgr.close_session(&session.id).unwrap();
        assert!(!mgr.has_session(&session.id));
        assert_eq!(
            mgr.close_session(&session.id),
            Err(SessionError::NotFound(session.id.clone()))
        );
    }

    #[test]
    fn test_ids_are_unique() {
        let mgr = SessionManager::default();
        let a = mgr.create_session().unwrap();
        let b = mgr.create_session().unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(mgr.list_sessions().len(), 2);
    }

    #[test]
    fn test_max_sessions() {
        let mgr = manager(2);
        mgr.create_session().unwrap();
        mgr.create_session().unwrap();
        assert_eq!(mgr.create_session().unwrap_err(), SessionError::LimitReached(2));
    }

    #[test]
    fn test_get_unknown_session() {
        let mgr = SessionManager::default();
        assert!(matches!(mgr.get("nope"), Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_histories_are_isolated() {
        let mgr = SessionManager::default();
        let a = mgr.create_session().unwrap();
        let b = mgr.create_session().unwrap();

        a.lock_history().await.append(Turn::ok("in a", "x"));
        assert_eq!(a.turns().await.len(), 1);
        assert!(b.last_turn().await.is_none());
    }

    #[test]
    fn test_reap_idle_sessions() {
        let mgr = SessionManager::default();
        let kept = mgr.create_session().unwrap();
        mgr.create_session().unwrap();

        assert_eq!(mgr.reap_idle_longer_than(Duration::from_secs(60)), 0);
        std::thread::sleep(Duration::from_millis(20));
        kept.touch();
        assert_eq!(mgr.reap_idle_longer_than(Duration::from_millis(10)), 1);
        assert!(mgr.has_session(&kept.id));
    }

    #[test]
    fn test_reap_disabled_with_zero_timeout() {
        let mgr = SessionManager::new(SessionConfig {
            max_sessions: 0,
            idle_timeout_secs: 0,
        });
        mgr.create_session().unwrap();
        assert_eq!(mgr.reap_expired(), 0);
    }
}
