//! Session Handlers
//!
//! Session lifecycle plus `ask` and history reads.

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::Path, Extension, Json};

use crate::api::dto::{
    ApiResponse, AskRequest, AskResponse, CreateSessionResponse, HistoryDto, TurnDto,
};
use crate::api::error::RestError;
use crate::Handler;

pub async fn create_session(
    Extension(handler): Extension<Arc<Handler>>,
) -> Result<Json<ApiResponse<CreateSessionResponse>>, RestError> {
    let session_id = handler.create_session()?;
    Ok(Json(ApiResponse::success(CreateSessionResponse { session_id })))
}

pub async fn close_session(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<String>>, RestError> {
    handler.close_session(&id)?;
    Ok(Json(ApiResponse::success(format!("Session {id} closed"))))
}

/// Ask a question. Failed asks still return 200 with an error-status answer;
/// the turn is part of the history either way.
pub async fn ask(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AskResponse>>, RestError> {
    let Json(request) = body?;
    let turn = handler.ask(&id, &request.question).await?;
    Ok(Json(ApiResponse::success(AskResponse::from(&turn))))
}

pub async fn last_turn(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Option<TurnDto>>>, RestError> {
    let last = handler.last_turn(&id).await?;
    Ok(Json(ApiResponse::success(last.map(TurnDto::from))))
}

pub async fn history(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<HistoryDto>>, RestError> {
    let turns = handler.history(&id).await?;
    Ok(Json(ApiResponse::success(HistoryDto {
        session_id: id,
        turns: turns.into_iter().map(TurnDto::from).collect(),
    })))
}
