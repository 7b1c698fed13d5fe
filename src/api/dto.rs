//! REST API Data Transfer Objects

use crate::gateway::StatsSnapshot;
use crate::session::{Turn, TurnStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON response: { success, data?, error? }
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorDto>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Error details in API response
#[derive(Debug, Serialize)]
pub struct ApiErrorDto {
    pub code: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub schema_version: String,
    pub active_sessions: usize,
    pub requests: StatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// The answer to one question
#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub status: TurnStatus,
}

impl From<&Turn> for AskResponse {
    fn from(turn: &Turn) -> Self {
        AskResponse {
            answer: turn.answer.clone(),
            status: turn.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TurnDto {
    pub question: String,
    pub answer: String,
    pub status: TurnStatus,
    pub timestamp: DateTime<Utc>,
}

impl From<Turn> for TurnDto {
    fn from(turn: Turn) -> Self {
        TurnDto {
            question: turn.question,
            answer: turn.answer,
            status: turn.status,
            timestamp: turn.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryDto {
    pub session_id: String,
    pub turns: Vec<TurnDto>,
}
