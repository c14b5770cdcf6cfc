//! API error types and responses

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rstuf_auth::AuthError;
use rstuf_core::{BootstrapState, ValidationErrors};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::bootstrap::CoordinatorError;
use crate::broker::BrokerError;
use crate::settings::SettingsError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationErrors),

    /// Missing, malformed or expired token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Username or password rejected at `POST /token`
    #[error("Login failed")]
    LoginFailed,

    /// The request is well formed but the repository is not in a state to
    /// accept it. Reported with status 200.
    #[error("Conflict: {error}")]
    Conflict {
        message: Option<String>,
        error: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The endpoint needs a finished bootstrap
    pub fn requires_bootstrap(state: &BootstrapState) -> Self {
        ApiError::Conflict {
            message: Some("Task not accepted.".into()),
            error: format!("It requires bootstrap finished. State: {}", state.describe()),
        }
    }

    /// The endpoint needs a finished bootstrap or one waiting for signatures
    pub fn requires_signing_or_bootstrap(state: &BootstrapState) -> Self {
        ApiError::Conflict {
            message: Some("Task not accepted.".into()),
            error: format!(
                "It requires bootstrap finished or signing. State: {}",
                state.describe()
            ),
        }
    }
}

/// Body of every non-validation error: `{"detail": {...}}`
#[derive(Serialize)]
pub struct ErrorDetail {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "detail": errors }),
            ),
            ApiError::LoginFailed => {
                return bearer_challenge(StatusCode::UNAUTHORIZED, json!({ "detail": "Unauthorized" }))
            }
            ApiError::Unauthorized(_) => {
                return bearer_challenge(
                    StatusCode::UNAUTHORIZED,
                    json!({ "detail": ErrorDetail { error: "Failed to validate token".into(), message: None } }),
                )
            }
            ApiError::Forbidden(error) => (
                StatusCode::FORBIDDEN,
                json!({ "detail": ErrorDetail { error, message: None } }),
            ),
            ApiError::Conflict { message, error } => (
                StatusCode::OK,
                json!({ "detail": ErrorDetail { error, message } }),
            ),
            ApiError::NotFound(error) => (
                StatusCode::NOT_FOUND,
                json!({ "detail": ErrorDetail { error, message: None } }),
            ),
            ApiError::Unavailable(error) => {
                error!(error = %error, "Backing service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "detail": ErrorDetail { error, message: None } }),
                )
            }
            ApiError::Internal(error) => {
                error!(error = %error, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": ErrorDetail { error, message: None } }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn bearer_challenge(status: StatusCode, body: serde_json::Value) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Unavailable(msg) => ApiError::Unavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Unavailable(msg) => ApiError::Unavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            conflict @ CoordinatorError::Conflict(_) => ApiError::Conflict {
                message: None,
                error: conflict.to_string(),
            },
            CoordinatorError::Settings(e) => e.into(),
            CoordinatorError::Broker(e) => e.into(),
            CoordinatorError::Serialization(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidTokenFormat(_) | AuthError::UserNotFound(_) => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::ScopeNotProvided(scope) | AuthError::ScopeNotFoundInUserScopes(scope) => {
                ApiError::Forbidden(format!("scope '{scope}' not allowed"))
            }
            AuthError::InvalidPassword => ApiError::LoginFailed,
            AuthError::InvalidExpiration(_) => ApiError::Validation(ValidationErrors::single(
                &["expires"],
                "value_error",
                err.to_string(),
            )),
            AuthError::Storage(e) => ApiError::Unavailable(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("Serialization error: {err}"))
    }
}
