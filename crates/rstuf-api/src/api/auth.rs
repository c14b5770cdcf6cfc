//! Bearer-token authorization
//!
//! Handlers name the scope they need in their signature:
//!
//! ```ignore
//! async fn handler(auth: Authorized<scope::WriteTargets>, ...) -> ...
//! ```
//!
//! With authentication disabled the extractor always succeeds and carries
//! no claims.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use rstuf_auth::{ScopeName, TokenClaims};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

use super::error::ApiError;
use super::state::AppState;

/// A scope an endpoint requires
pub trait RequiredScope: Send + Sync + 'static {
    const SCOPE: ScopeName;
}

macro_rules! required_scopes {
    ($($marker:ident),* $(,)?) => {
        $(
            #[derive(Debug)]
            pub struct $marker;

            impl RequiredScope for $marker {
                const SCOPE: ScopeName = ScopeName::$marker;
            }
        )*
    };
}

/// Marker types for [`Authorized`]
pub mod scope {
    use super::{RequiredScope, ScopeName};

    required_scopes!(
        ReadBootstrap,
        ReadSettings,
        ReadTasks,
        ReadToken,
        WriteBootstrap,
        WriteTargets,
        WriteToken,
        DeleteTargets,
    );
}

/// Proof that the caller holds scope `S`
#[derive(Debug)]
pub struct Authorized<S> {
    /// `None` when authentication is disabled
    pub claims: Option<TokenClaims>,
    _scope: PhantomData<S>,
}

impl<S> Authorized<S> {
    pub fn username(&self) -> Option<&str> {
        self.claims.as_ref().map(|c| c.username.as_str())
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then_some(token.trim())
        .filter(|t| !t.is_empty())
}

impl<S: RequiredScope> FromRequestParts<Arc<AppState>> for Authorized<S> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if !state.auth_enabled {
            return Ok(Self {
                claims: None,
                _scope: PhantomData,
            });
        }

        let auth = state
            .auth
            .as_ref()
            .ok_or_else(|| ApiError::Unavailable("authentication is not configured".into()))?;
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

        let claims = auth.validate_token(token, &[S::SCOPE]).await.map_err(|e| {
            warn!(path = %parts.uri.path(), scope = %S::SCOPE, error = %e, "Rejected request");
            ApiError::from(e)
        })?;

        Ok(Self {
            claims: Some(claims),
            _scope: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/task");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }

    #[test]
    fn test_markers_name_their_scope() {
        assert_eq!(scope::WriteTargets::SCOPE.as_str(), "write:targets");
        assert_eq!(scope::DeleteTargets::SCOPE.as_str(), "delete:targets");
    }
}
