//! Artifact Handlers
//!
//! Adding, removing and publishing target files.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use rstuf_core::payload::{AddArtifactsPayload, DeleteArtifactsPayload};
use rstuf_core::{TaskAction, TaskId};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::{accepted, require_bootstrap, Accepted, TaskSubmitted};
use crate::api::auth::{scope, Authorized};
use crate::api::error::ApiError;
use crate::api::extract::ValidJson;
use crate::api::state::AppState;

const SKIP_PUBLISHING: &str = " Publishing will be skipped.";

/// Data returned when artifacts are submitted
#[derive(Debug, Serialize)]
pub struct ArtifactsSubmitted {
    pub artifacts: Vec<String>,
    pub task_id: TaskId,
    pub last_update: DateTime<Utc>,
}

fn message(base: &str, publish_artifacts: bool) -> String {
    if publish_artifacts {
        base.to_string()
    } else {
        format!("{base}{SKIP_PUBLISHING}")
    }
}

/// POST /api/v1/artifacts
pub async fn add_artifacts(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(mut payload): ValidJson<AddArtifactsPayload>,
) -> Result<Accepted<ArtifactsSubmitted>, ApiError> {
    require_bootstrap(&state).await?;

    let task_id = TaskId::generate();
    if payload.add_task_id_to_custom {
        payload.stamp_task_id(&task_id);
    }
    state
        .dispatcher
        .submit_with_id(&task_id, TaskAction::AddArtifacts, serde_json::to_value(&payload)?)
        .await?;

    Ok(accepted(
        ArtifactsSubmitted {
            artifacts: payload.paths(),
            task_id,
            last_update: Utc::now(),
        },
        message("New Artifact(s) successfully submitted.", payload.publish_artifacts),
    ))
}

/// POST /api/v1/artifacts/delete
pub async fn delete_artifacts(
    _auth: Authorized<scope::DeleteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<DeleteArtifactsPayload>,
) -> Result<Accepted<ArtifactsSubmitted>, ApiError> {
    require_bootstrap(&state).await?;

    let task_id = state
        .dispatcher
        .submit(TaskAction::RemoveArtifacts, serde_json::to_value(&payload)?)
        .await?;

    Ok(accepted(
        ArtifactsSubmitted {
            artifacts: payload.artifacts,
            task_id,
            last_update: Utc::now(),
        },
        message("Remove Artifact(s) successfully submitted.", payload.publish_artifacts),
    ))
}

/// POST /api/v1/artifacts/publish
pub async fn publish_artifacts(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    require_bootstrap(&state).await?;

    let task_id = state
        .dispatcher
        .submit(TaskAction::PublishArtifacts, Value::Null)
        .await?;

    Ok(accepted(
        TaskSubmitted::now(task_id),
        "Publish artifacts successfully submitted.",
    ))
}
