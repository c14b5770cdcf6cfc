//! Mock Authentication Service
//!
//! For testing purposes. Tokens are plain strings, not JWTs.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{AuthError, Result};
use crate::service::{AuthenticationService, TokenRequest, ADMIN_USERNAME, MAX_EXPIRES_HOURS};
use crate::types::{ScopeName, Token, TokenClaims, TokenInfo};

#[derive(Debug, Clone)]
struct MockUser {
    password: String,
    scopes: Vec<String>,
}

/// Mock authentication service for testing
///
/// Issues and accepts tokens in the format:
/// - "mock:username" - A token with no scopes
/// - "mock:username:scope1,scope2" - A token with the given scopes
///
/// Only registered users validate.
#[derive(Debug, Default)]
pub struct MockAuthService {
    users: RwLock<HashMap<String, MockUser>>,
}

impl MockAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user holding `scopes`
    pub fn with_user(self, username: &str, password: &str, scopes: &[ScopeName]) -> Self {
        if let Ok(mut users) = self.users.write() {
            users.insert(
                username.to_string(),
                MockUser {
                    password: password.to_string(),
                    scopes: scopes.iter().map(|s| s.to_string()).collect(),
                },
            );
        }
        self
    }

    /// Token string accepted by this service
    pub fn token_for(username: &str, scopes: &[ScopeName]) -> String {
        let scopes: Vec<&str> = scopes.iter().map(|s| s.as_str()).collect();
        format!("mock:{}:{}", username, scopes.join(","))
    }

    fn user(&self, username: &str) -> Result<MockUser> {
        self.users
            .read()
            .map_err(|_| AuthError::Internal("mock users lock poisoned".into()))?
            .get(username)
            .cloned()
            .ok_or_else(|| AuthError::UserNotFound(username.to_string()))
    }

    fn parse(token: &str) -> Result<(String, Vec<String>)> {
        let rest = token
            .strip_prefix("mock:")
            .ok_or_else(|| AuthError::InvalidTokenFormat("not a mock token".into()))?;
        let (username, scopes) = rest.split_once(':').unwrap_or((rest, ""));
        if username.is_empty() {
            return Err(AuthError::InvalidTokenFormat(
                "mock token has no username".into(),
            ));
        }
        let scopes = scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Ok((username.to_string(), scopes))
    }
}

#[async_trait]
impl AuthenticationService for MockAuthService {
    async fn issue_token(&self, request: TokenRequest) -> Result<Token> {
        if request.expires_hours == 0 || request.expires_hours > MAX_EXPIRES_HOURS {
            return Err(AuthError::InvalidExpiration(request.expires_hours));
        }
        let user = self.user(&request.username)?;
        if let Some(password) = &request.password {
            if *password != user.password {
                return Err(AuthError::InvalidPassword);
            }
        }
        if let Some(missing) = request.scopes.iter().find(|s| !user.scopes.contains(*s)) {
            return Err(AuthError::ScopeNotFoundInUserScopes(missing.clone()));
        }
        Ok(Token::bearer(format!(
            "mock:{}:{}",
            request.username,
            request.scopes.join(",")
        )))
    }

    async fn validate_token(&self, token: &str, required: &[ScopeName]) -> Result<TokenClaims> {
        let (username, scopes) = Self::parse(token)?;
        self.user(&username)?;

        let claims = TokenClaims {
            sub: format!("user_0_{username}"),
            username,
            scopes,
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        if let Some(scope) = required.iter().find(|s| !claims.has_scope(**s)) {
            return Err(AuthError::ScopeNotProvided(scope.to_string()));
        }
        Ok(claims)
    }

    async fn inspect_token(&self, token: &str) -> Result<TokenInfo> {
        let (username, scopes) = Self::parse(token)?;
        Ok(TokenInfo {
            username,
            scopes,
            expired: false,
            expiration: Utc::now() + Duration::hours(1),
        })
    }

    async fn bootstrap_admin(&self) -> Result<()> {
        let mut users = self
            .users
            .write()
            .map_err(|_| AuthError::Internal("mock users lock poisoned".into()))?;
        users
            .entry(ADMIN_USERNAME.to_string())
            .or_insert_with(|| MockUser {
                password: ADMIN_USERNAME.to_string(),
                scopes: ScopeName::ALL.iter().map(|s| s.to_string()).collect(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_for_validates() {
        let auth = MockAuthService::new().with_user("alice", "pw", &[ScopeName::ReadTasks]);
        let token = MockAuthService::token_for("alice", &[ScopeName::ReadTasks]);

        let claims = auth
            .validate_token(&token, &[ScopeName::ReadTasks])
            .await
            .unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.scopes, vec!["read:tasks"]);
    }

    #[tokio::test]
    async fn test_missing_scope() {
        let auth = MockAuthService::new().with_user("alice", "pw", &[]);
        let err = auth
            .validate_token("mock:alice", &[ScopeName::WriteTargets])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ScopeNotProvided(_)));
    }

    #[tokio::test]
    async fn test_unknown_user_and_garbage() {
        let auth = MockAuthService::new();
        assert!(matches!(
            auth.validate_token("mock:bob:read:tasks", &[]).await,
            Err(AuthError::UserNotFound(_))
        ));
        assert!(matches!(
            auth.validate_token("bearer-ish", &[]).await,
            Err(AuthError::InvalidTokenFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_checks_password_and_scopes() {
        let auth = MockAuthService::new().with_user("alice", "pw", &[ScopeName::ReadTasks]);

        let token = auth
            .issue_token(TokenRequest::login("alice", "pw", vec!["read:tasks".into()], 1))
            .await
            .unwrap();
        assert_eq!(token.access_token, "mock:alice:read:tasks");
        assert_eq!(token.token_type, "bearer");

        assert!(matches!(
            auth.issue_token(TokenRequest::login("alice", "bad", vec![], 1)).await,
            Err(AuthError::InvalidPassword)
        ));
        assert!(matches!(
            auth.issue_token(TokenRequest::login("alice", "pw", vec!["write:token".into()], 1))
                .await,
            Err(AuthError::ScopeNotFoundInUserScopes(_))
        ));
    }
}
