//! Bootstrap Handlers
//!
//! `GET /bootstrap` reports the lock state; `POST /bootstrap` takes the
//! lock and hands the initial metadata to the worker.

use axum::{extract::State, Json};
use rstuf_core::payload::BootstrapPayload;
use rstuf_core::BootstrapState;
use std::sync::Arc;
use tracing::info;

use super::{accepted, Accepted, ApiResponse, TaskSubmitted};
use crate::api::auth::{scope, Authorized};
use crate::api::error::ApiError;
use crate::api::extract::ValidJson;
use crate::api::state::AppState;

/// GET /api/v1/bootstrap
pub async fn get_bootstrap(
    _auth: Authorized<scope::ReadBootstrap>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<BootstrapState>>, ApiError> {
    let bootstrap = state.coordinator.state().await?;
    let message = if bootstrap.is_locked() {
        "System LOCKED for bootstrap."
    } else {
        "System available for bootstrap."
    };
    Ok(Json(ApiResponse::new(bootstrap, message)))
}

/// POST /api/v1/bootstrap
pub async fn post_bootstrap(
    _auth: Authorized<scope::WriteBootstrap>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<BootstrapPayload>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    let (task_id, _supervisor) = state.coordinator.begin_bootstrap(&payload).await?;
    info!(task_id = %task_id, timeout_secs = payload.timeout, "Bootstrap accepted");
    Ok(accepted(TaskSubmitted::now(task_id), "Bootstrap accepted."))
}
