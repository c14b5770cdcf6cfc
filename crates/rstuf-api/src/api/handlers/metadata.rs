//! Metadata Handlers
//!
//! Root rotation, forced online-role refreshes and the threshold-signing
//! workflow for roles whose draft is waiting for offline signatures.

use axum::{extract::State, Json};
use rstuf_core::payload::{
    MetadataOnlinePayload, MetadataSignDeletePayload, MetadataSignPayload, MetadataUpdatePayload,
};
use rstuf_core::roles::{online_roles, role_from_signing_key};
use rstuf_core::{TaskAction, ValidationErrors};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use super::{
    accepted, require_bootstrap, require_bootstrap_or_signing, Accepted, ApiResponse,
    TaskSubmitted,
};
use crate::api::auth::{scope, Authorized};
use crate::api::error::ApiError;
use crate::api::extract::ValidJson;
use crate::api::state::AppState;

/// POST /api/v1/metadata
pub async fn post_metadata(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<MetadataUpdatePayload>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    require_bootstrap(&state).await?;

    let task_id = state
        .dispatcher
        .submit(TaskAction::MetadataUpdate, serde_json::to_value(&payload)?)
        .await?;
    Ok(accepted(TaskSubmitted::now(task_id), "Metadata update accepted."))
}

/// POST /api/v1/metadata/online
pub async fn post_metadata_online(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<MetadataOnlinePayload>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    require_bootstrap(&state).await?;

    let targets_online_key = state.settings.targets_online_key().await?;
    if !targets_online_key {
        warn!("Rejected online metadata update: targets uses an offline key");
        return Err(ApiError::Conflict {
            message: Some("Task not accepted.".into()),
            error: "Targets is an offline role, use other endpoint to update".into(),
        });
    }

    let online = online_roles(targets_online_key);
    if let Some(role) = payload.roles.iter().find(|r| !online.contains(*r)) {
        return Err(ValidationErrors::single(
            &["roles"],
            "value_error",
            format!("'{role}' is not an online role"),
        )
        .into());
    }

    let payload = payload.expand(targets_online_key);
    let task_id = state
        .dispatcher
        .submit(
            TaskAction::ForceOnlineMetadataUpdate,
            serde_json::to_value(&payload)?,
        )
        .await?;
    Ok(accepted(
        TaskSubmitted::now(task_id),
        "Force new online metadata update accepted.",
    ))
}

/// Drafts waiting for signatures, keyed by role
#[derive(Debug, Serialize)]
pub struct PendingSignatures {
    pub metadata: BTreeMap<String, Value>,
}

/// GET /api/v1/metadata/sign
pub async fn get_metadata_sign(
    _auth: Authorized<scope::ReadSettings>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<PendingSignatures>>, ApiError> {
    require_bootstrap_or_signing(&state).await?;

    let mut metadata = BTreeMap::new();
    for (key, draft) in state.settings.pending_signing().await? {
        let Some(role) = role_from_signing_key(&key) else {
            continue;
        };
        if let Some(trusted) = state.settings.role_trusted(&role).await? {
            metadata.insert(format!("trusted_{role}"), trusted);
        }
        metadata.insert(role, draft);
    }

    let message = if metadata.is_empty() {
        "No metadata pending signing available"
    } else {
        "Metadata role(s) pending signature"
    };
    Ok(Json(ApiResponse::new(PendingSignatures { metadata }, message)))
}

async fn require_pending(state: &AppState, role: &str) -> Result<(), ApiError> {
    if state.settings.role_signing(role).await?.is_none() {
        return Err(ApiError::Conflict {
            message: Some("Signature Failed".into()),
            error: format!("No signatures pending for {role}"),
        });
    }
    Ok(())
}

/// POST /api/v1/metadata/sign
pub async fn post_metadata_sign(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<MetadataSignPayload>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    require_bootstrap_or_signing(&state).await?;
    require_pending(&state, &payload.role).await?;

    let task_id = state
        .dispatcher
        .submit(TaskAction::SignMetadata, serde_json::to_value(&payload)?)
        .await?;
    Ok(accepted(TaskSubmitted::now(task_id), "Metadata sign accepted."))
}

/// POST /api/v1/metadata/sign/delete
pub async fn post_metadata_sign_delete(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<MetadataSignDeletePayload>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    require_bootstrap_or_signing(&state).await?;
    require_pending(&state, &payload.role).await?;

    let task_id = state
        .dispatcher
        .submit(TaskAction::DeleteSignMetadata, serde_json::to_value(&payload)?)
        .await?;
    Ok(accepted(
        TaskSubmitted::now(task_id),
        "Metadata sign delete accepted.",
    ))
}
