//! Token Handlers
//!
//! `POST /token` is the only unauthenticated endpoint besides `/health`: it
//! exchanges a username and password for a bearer token.

use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::{Form, Json};
use rstuf_auth::{
    AuthError, AuthenticationService, ScopeName, Token, TokenInfo, TokenRequest, ADMIN_USERNAME,
    MAX_EXPIRES_HOURS,
};
use rstuf_core::{Validate, ValidationErrors, Validator};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::ApiResponse;
use crate::api::auth::{scope, Authorized};
use crate::api::error::ApiError;
use crate::api::extract::ValidJson;
use crate::api::state::AppState;

fn default_expires() -> u32 {
    1
}

fn check_expires(v: &mut Validator, expires: u32) {
    v.field("expires", |v| {
        v.check(
            expires >= 1,
            "greater_than_equal",
            "Input should be greater than or equal to 1",
        );
        v.check(
            expires <= MAX_EXPIRES_HOURS,
            "less_than_equal",
            format!("Input should be less than or equal to {MAX_EXPIRES_HOURS}"),
        );
    });
}

fn check_scopes(v: &mut Validator, scopes: &[String]) {
    v.field("scopes", |v| {
        for (i, name) in scopes.iter().enumerate() {
            v.field(i.to_string(), |v| {
                v.check(
                    name.parse::<ScopeName>().is_ok(),
                    "enum",
                    format!("'{name}' is not a known scope"),
                )
            });
        }
    });
}

fn service(state: &AppState) -> Result<&Arc<dyn AuthenticationService>, ApiError> {
    state
        .auth
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("authentication is not configured".into()))
}

/// OAuth2 password-flow form
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    /// Space-separated scope names
    #[serde(default)]
    pub scope: String,
    /// Hours until the token expires
    #[serde(default = "default_expires")]
    pub expires: u32,
}

impl LoginForm {
    fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }
}

impl Validate for LoginForm {
    fn validate(&self, v: &mut Validator) {
        v.field("username", |v| v.non_empty(&self.username));
        check_scopes(v, &self.scopes());
        check_expires(v, self.expires);
    }
}

/// POST /api/v1/token
pub async fn post_token(
    State(state): State<Arc<AppState>>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<Token>, ApiError> {
    let Form(form) = form.map_err(|e| ValidationErrors::malformed_body(e.body_text()))?;
    form.validated()?;

    let request = TokenRequest::login(
        form.username.clone(),
        form.password.clone(),
        form.scopes(),
        form.expires,
    );
    match service(&state)?.issue_token(request).await {
        Ok(token) => Ok(Json(token)),
        Err(AuthError::UserNotFound(_) | AuthError::InvalidPassword) => {
            warn!(username = %form.username, "Failed login");
            Err(ApiError::LoginFailed)
        }
        Err(e) => Err(e.into()),
    }
}

/// `POST /token/new` body
#[derive(Debug, Deserialize)]
pub struct NewTokenPayload {
    pub scopes: Vec<String>,
    #[serde(default = "default_expires")]
    pub expires: u32,
}

impl Validate for NewTokenPayload {
    fn validate(&self, v: &mut Validator) {
        check_scopes(v, &self.scopes);
        check_expires(v, self.expires);
    }
}

/// POST /api/v1/token/new
///
/// Issues a token for the caller's own account. Without authentication the
/// token belongs to the admin account.
pub async fn post_token_new(
    auth: Authorized<scope::WriteToken>,
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<NewTokenPayload>,
) -> Result<Json<Token>, ApiError> {
    let username = auth.username().unwrap_or(ADMIN_USERNAME).to_string();
    let request = TokenRequest::delegated(username.clone(), payload.scopes, payload.expires);
    let token = service(&state)?.issue_token(request).await?;
    info!(username = %username, "Issued token on behalf of authenticated user");
    Ok(Json(token))
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// GET /api/v1/token?token=<token>
pub async fn get_token(
    _auth: Authorized<scope::ReadToken>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ApiResponse<TokenInfo>>, ApiError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ValidationErrors::query("token", "missing", "Field required"))?;

    let info = service(&state)?
        .inspect_token(&token)
        .await
        .map_err(|e| match e {
            AuthError::InvalidTokenFormat(msg) => ApiError::Validation(ValidationErrors::query(
                "token",
                "value_error",
                format!("Failed to decode token: {msg}"),
            )),
            other => other.into(),
        })?;
    Ok(Json(ApiResponse::new(info, "Token information")))
}
