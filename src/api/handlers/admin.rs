//! Health endpoint

use std::sync::Arc;

use axum::{Extension, Json};

use crate::api::dto::{ApiResponse, HealthDto};
use crate::api::error::RestError;
use crate::Handler;

pub async fn health(
    Extension(handler): Extension<Arc<Handler>>,
) -> Result<Json<ApiResponse<HealthDto>>, RestError> {
    let health = HealthDto {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: handler.uptime_seconds(),
        schema_version: handler.gateway().catalog().describe().version.clone(),
        active_sessions: handler.session_manager().session_count(),
        requests: handler.stats(),
    };

    Ok(Json(ApiResponse::success(health)))
}
