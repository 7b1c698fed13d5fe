//! Conversation history: an append-only, ordered log of turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Ok,
    Error,
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnStatus::Ok => write!(f, "ok"),
            TurnStatus::Error => write!(f, "error"),
        }
    }
}

/// One question and the answer it received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub status: TurnStatus,
    pub timestamp: DateTime<Utc>,
    /// Error kind for failed turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl Turn {
    pub fn ok(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Turn {
            question: question.into(),
            answer: answer.into(),
            status: TurnStatus::Ok,
            timestamp: Utc::now(),
            error_kind: None,
        }
    }

    pub fn error(
        question: impl Into<String>,
        answer: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Turn {
            question: question.into(),
            answer: answer.into(),
            status: TurnStatus::Error,
            timestamp: Utc::now(),
            error_kind: Some(kind.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TurnStatus::Ok
    }
}

/// Turns of one session in the order their requests arrived.
///
/// There is no removal or reordering; a turn once appended stays where it is.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    turns: Vec<Turn>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Most recent turn
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// All turns, oldest first
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    /// Restartable iterator over the turns, oldest first
    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
