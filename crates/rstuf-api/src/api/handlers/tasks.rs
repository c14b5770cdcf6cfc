//! Task Handlers

use axum::extract::{Query, State};
use axum::Json;
use rstuf_core::{TaskView, ValidationErrors};
use serde::Deserialize;
use std::sync::Arc;

use super::ApiResponse;
use crate::api::auth::{scope, Authorized};
use crate::api::error::ApiError;
use crate::api::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub task_id: Option<String>,
}

/// GET /api/v1/task?task_id=<id>
pub async fn get_task(
    _auth: Authorized<scope::ReadTasks>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<ApiResponse<TaskView>>, ApiError> {
    let task_id = query
        .task_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ValidationErrors::query("task_id", "missing", "Field required"))?;

    let (task_state, outcome) = state.dispatcher.result(&task_id).await?;
    let view = TaskView::normalize(task_id, task_state, outcome);
    Ok(Json(ApiResponse::new(view, "Task state.")))
}
