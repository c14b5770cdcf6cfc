//! Delegation Handlers
//!
//! All three endpoints submit a `metadata_delegation` task; the payload's
//! `action` field tells the worker what to do with the listed roles.

use axum::extract::State;
use rstuf_core::payload::{DelegationChange, DelegationsPayload, DeleteDelegationsPayload};
use rstuf_core::TaskAction;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::{accepted, require_bootstrap, Accepted, TaskSubmitted};
use crate::api::auth::{scope, Authorized};
use crate::api::error::ApiError;
use crate::api::extract::ValidJson;
use crate::api::state::AppState;

/// Serialize `payload` with `"action": <change>` added at the top level
fn stamped<T: Serialize>(payload: &T, change: DelegationChange) -> Result<Value, ApiError> {
    let mut value = serde_json::to_value(payload)?;
    if let Value::Object(fields) = &mut value {
        fields.insert("action".into(), serde_json::to_value(change)?);
    }
    Ok(value)
}

async fn submit(
    state: &AppState,
    payload: Value,
    message: &str,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    require_bootstrap(state).await?;
    let task_id = state
        .dispatcher
        .submit(TaskAction::MetadataDelegation, payload)
        .await?;
    Ok(accepted(TaskSubmitted::now(task_id), message))
}

/// POST /api/v1/delegations
pub async fn post_delegations(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<DelegationsPayload>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    let payload = stamped(&payload, DelegationChange::Add)?;
    submit(&state, payload, "Metadata delegation accepted.").await
}

/// PUT /api/v1/delegations
pub async fn put_delegations(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<DelegationsPayload>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    let payload = stamped(&payload, DelegationChange::Update)?;
    submit(&state, payload, "Metadata delegation update accepted.").await
}

/// POST /api/v1/delegations/delete
pub async fn delete_delegations(
    _auth: Authorized<scope::WriteTargets>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<DeleteDelegationsPayload>,
) -> Result<Accepted<TaskSubmitted>, ApiError> {
    let payload = stamped(&payload, DelegationChange::Delete)?;
    submit(&state, payload, "Metadata delegation delete accepted.").await
}
