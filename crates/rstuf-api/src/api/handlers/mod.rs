//! API request handlers

pub mod artifacts;
pub mod bootstrap;
pub mod config;
pub mod delegations;
pub mod metadata;
pub mod tasks;
pub mod token;

use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rstuf_core::{BootstrapState, TaskId};
use serde::Serialize;

use super::error::ApiError;
use super::state::AppState;

/// Success body: `{"data": ..., "message": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
        }
    }
}

/// Data returned for every accepted task
#[derive(Debug, Serialize)]
pub struct TaskSubmitted {
    pub task_id: TaskId,
    pub last_update: DateTime<Utc>,
}

impl TaskSubmitted {
    pub fn now(task_id: TaskId) -> Self {
        Self {
            task_id,
            last_update: Utc::now(),
        }
    }
}

/// 202 with a `{data, message}` body
pub type Accepted<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn accepted<T>(data: T, message: impl Into<String>) -> Accepted<T> {
    (StatusCode::ACCEPTED, Json(ApiResponse::new(data, message)))
}

/// Fail unless bootstrap has finished
pub async fn require_bootstrap(state: &AppState) -> Result<BootstrapState, ApiError> {
    let bootstrap = state.settings.bootstrap_state().await?;
    if !bootstrap.is_finished() {
        return Err(ApiError::requires_bootstrap(&bootstrap));
    }
    Ok(bootstrap)
}

/// Fail unless bootstrap has finished or is waiting for signatures
pub async fn require_bootstrap_or_signing(state: &AppState) -> Result<BootstrapState, ApiError> {
    let bootstrap = state.settings.bootstrap_state().await?;
    if !(bootstrap.is_finished() || bootstrap.is_signing()) {
        return Err(ApiError::requires_signing_or_bootstrap(&bootstrap));
    }
    Ok(bootstrap)
}
