//! Settings Handlers

use axum::{extract::State, Json};
use rstuf_core::payload::ConfigPutPayload;
use rstuf_core::roles::online_roles;
use rstuf_core::TaskAction;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{accepted, require_bootstrap, Accepted, ApiResponse, TaskSubmitted};
use crate::api::auth::{scope, Authorized};
use crate::api::error::ApiError;
use crate::api::extract::ValidJson;
use crate::api::state::AppState;

/// GET /api/v1/config
///
/// Every repository setting, keys lower-cased.
pub async fn get_config(
    _auth: Authorized<scope::ReadSettings>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<BTreeMap<String, Value>>>, ApiError> {
    if state.settings.bootstrap_state().await?.is_absent() {
        return Err(ApiError::NotFound(
            "System has not a Repository Metadata".into(),
        ));
    }

    let settings = state
        .settings
        .snapshot()
        .await?
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect();
    Ok(Json(ApiResponse::new(settings, "Current Settings")))
}

/// PUT /api/v1/config
pub async fn put_config(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<ConfigPutPayload>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    require_bootstrap(&state).await?;

    let online = online_roles(state.settings.targets_online_key().await?);
    payload.check_online_roles(&online)?;

    let task_id = state
        .dispatcher
        .submit(TaskAction::UpdateSettings, serde_json::to_value(&payload)?)
        .await?;
    Ok(accepted(TaskSubmitted::now(task_id), "Settings update accepted."))
}
