//! Token issuance and validation

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AuthError, Result};
use crate::password::Hasher;
use crate::storage::{AuthStore, StorageError};
use crate::types::{Scope, ScopeName, Token, TokenClaims, TokenInfo, User};

/// Name of the account created by [`AuthenticationService::bootstrap_admin`]
pub const ADMIN_USERNAME: &str = "admin";

/// Longest token lifetime that can be requested (ten years)
pub const MAX_EXPIRES_HOURS: u32 = 24 * 365 * 10;

/// Expiration instant of a token issued now for `hours`
fn expiration(hours: u32) -> Result<DateTime<Utc>> {
    if hours == 0 || hours > MAX_EXPIRES_HOURS {
        return Err(AuthError::InvalidExpiration(hours));
    }
    Utc::now()
        .checked_add_signed(Duration::hours(i64::from(hours)))
        .ok_or(AuthError::InvalidExpiration(hours))
}

/// A request to issue a token
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub username: String,
    /// Checked against the stored hash when present
    pub password: Option<String>,
    pub scopes: Vec<String>,
    pub expires_hours: u32,
}

impl TokenRequest {
    /// Password login
    pub fn login(
        username: impl Into<String>,
        password: impl Into<String>,
        scopes: Vec<String>,
        expires_hours: u32,
    ) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            scopes,
            expires_hours,
        }
    }

    /// Token for an already authenticated user
    pub fn delegated(username: impl Into<String>, scopes: Vec<String>, expires_hours: u32) -> Self {
        Self {
            username: username.into(),
            password: None,
            scopes,
            expires_hours,
        }
    }
}

/// Authentication operations used by the HTTP layer
#[async_trait]
pub trait AuthenticationService: Send + Sync {
    /// Issue a token carrying the requested scopes
    ///
    /// Every requested scope must be granted to the user.
    async fn issue_token(&self, request: TokenRequest) -> Result<Token>;

    /// Decode a token and require every scope in `required`
    async fn validate_token(&self, token: &str, required: &[ScopeName]) -> Result<TokenClaims>;

    /// Decode a token without rejecting it for being expired
    async fn inspect_token(&self, token: &str) -> Result<TokenInfo>;

    /// Ensure the scope catalogue and the admin account exist
    ///
    /// Safe to call on every start.
    async fn bootstrap_admin(&self) -> Result<()>;
}

/// Store-backed authentication service
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    secret: String,
    admin_password: Option<String>,
    hasher: Hasher,
}

impl AuthService {
    /// Fails with `SecretKeyNotFound` when no signing secret is configured
    pub fn new(
        store: Arc<dyn AuthStore>,
        secret: Option<String>,
        admin_password: Option<String>,
    ) -> Result<Self> {
        let secret = secret
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::SecretKeyNotFound)?;
        Ok(Self {
            store,
            secret,
            admin_password: admin_password.filter(|p| !p.is_empty()),
            hasher: Hasher::new(),
        })
    }

    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    async fn hash_password(&self, password: &str) -> Result<String> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    async fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let password_hash = password_hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash)).await?
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<User> {
        let hash = self.hash_password(password).await?;
        self.store
            .create_user(username, &hash)
            .await
            .map_err(|e| match e {
                StorageError::AlreadyExists(_) => AuthError::UserAlreadyExists(username.to_string()),
                other => AuthError::Storage(other),
            })
    }

    pub async fn create_scope(&self, scope: ScopeName) -> Result<Scope> {
        self.store
            .create_scope(scope.as_str(), scope.description())
            .await
            .map_err(|e| match e {
                StorageError::AlreadyExists(_) => AuthError::ScopeAlreadyExists(scope.to_string()),
                other => AuthError::Storage(other),
            })
    }

    /// Grant scopes to a user, skipping those already granted
    pub async fn grant_scopes(&self, user: &User, scopes: &[ScopeName]) -> Result<()> {
        let granted = self.granted_scopes(user.id).await?;
        for scope in scopes {
            if granted.contains(scope.as_str()) {
                continue;
            }
            let stored = self
                .store
                .get_scope_by_name(scope.as_str())
                .await?
                .ok_or_else(|| AuthError::Internal(format!("scope {scope} is not in the catalogue")))?;
            match self.store.grant_scope(user.id, stored.id).await {
                Ok(_) | Err(StorageError::AlreadyExists(_)) => {
                    debug!(username = %user.username, scope = %scope, "Granted scope");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn granted_scopes(&self, user_id: i64) -> Result<BTreeSet<String>> {
        Ok(self
            .store
            .user_scopes(user_id)
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

#[async_trait]
impl AuthenticationService for AuthService {
    async fn issue_token(&self, request: TokenRequest) -> Result<Token> {
        let expires = expiration(request.expires_hours)?;
        let user = self
            .store
            .get_user_by_username(&request.username)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(request.username.clone()))?;

        if let Some(password) = &request.password {
            if !self.verify_password(password, &user.password_hash).await? {
                warn!(username = %request.username, "Rejected login with invalid password");
                return Err(AuthError::InvalidPassword);
            }
        }

        let granted = self.granted_scopes(user.id).await?;
        if let Some(missing) = request.scopes.iter().find(|s| !granted.contains(*s)) {
            warn!(username = %user.username, scope = %missing, "Token requested for ungranted scope");
            return Err(AuthError::ScopeNotFoundInUserScopes(missing.clone()));
        }

        let claims = TokenClaims {
            sub: format!("user_{}_{:016x}", user.id, rand::random::<u64>()),
            username: user.username.clone(),
            scopes: request.scopes,
            exp: expires.timestamp(),
        };
        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        info!(
            username = %user.username,
            scopes = ?claims.scopes,
            expires = %expires,
            "Issued token"
        );

        Ok(Token::bearer(access_token))
    }

    async fn validate_token(&self, token: &str, required: &[ScopeName]) -> Result<TokenClaims> {
        let claims = self.decode(token, true)?;

        let user = self
            .store
            .get_user_by_username(&claims.username)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(claims.username.clone()))?;
        if claims.user_id() != Some(user.id) {
            warn!(username = %claims.username, sub = %claims.sub, "Token subject does not match user");
            return Err(AuthError::UserNotFound(claims.username.clone()));
        }

        if let Some(scope) = required.iter().find(|s| !claims.has_scope(**s)) {
            warn!(username = %claims.username, scope = %scope, "Token lacks required scope");
            return Err(AuthError::ScopeNotProvided(scope.to_string()));
        }

        Ok(claims)
    }

    async fn inspect_token(&self, token: &str) -> Result<TokenInfo> {
        let claims = self.decode(token, false)?;
        let expiration = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::InvalidTokenFormat("exp out of range".into()))?;
        Ok(TokenInfo {
            username: claims.username,
            scopes: claims.scopes,
            expired: expiration <= Utc::now(),
            expiration,
        })
    }

    async fn bootstrap_admin(&self) -> Result<()> {
        let password = self
            .admin_password
            .clone()
            .ok_or(AuthError::AdminPasswordNotFound)?;

        for scope in ScopeName::ALL {
            if self.store.get_scope_by_name(scope.as_str()).await?.is_some() {
                continue;
            }
            match self.create_scope(scope).await {
                Ok(_) | Err(AuthError::ScopeAlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let admin = match self.store.get_user_by_username(ADMIN_USERNAME).await? {
            Some(user) => user,
            None => match self.create_user(ADMIN_USERNAME, &password).await {
                Ok(user) => {
                    info!(username = ADMIN_USERNAME, "Created admin account");
                    user
                }
                // Another instance created it first.
                Err(AuthError::UserAlreadyExists(_)) => self
                    .store
                    .get_user_by_username(ADMIN_USERNAME)
                    .await?
                    .ok_or_else(|| AuthError::UserNotFound(ADMIN_USERNAME.into()))?,
                Err(e) => return Err(e),
            },
        };

        self.grant_scopes(&admin, &ScopeName::ALL).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryAuthStore;

    async fn service() -> AuthService {
        let service = AuthService::new(
            Arc::new(MemoryAuthStore::new()),
            Some("test-secret".into()),
            Some("admin-pw".into()),
        )
        .unwrap()
        .with_hasher(Hasher::with_cost(8, 1).unwrap());
        service.bootstrap_admin().await.unwrap();
        service
    }

    #[test]
    fn test_secret_is_required() {
        let store = Arc::new(MemoryAuthStore::new());
        assert!(matches!(
            AuthService::new(store.clone(), None, None),
            Err(AuthError::SecretKeyNotFound)
        ));
        assert!(matches!(
            AuthService::new(store, Some(String::new()), None),
            Err(AuthError::SecretKeyNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expiration_is_bounded() {
        let service = service().await;

        for hours in [0, MAX_EXPIRES_HOURS + 1, u32::MAX] {
            let err = service
                .issue_token(TokenRequest::login("admin", "admin-pw", vec![], hours))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidExpiration(h) if h == hours));
        }

        let token = service
            .issue_token(TokenRequest::login("admin", "admin-pw", vec![], MAX_EXPIRES_HOURS))
            .await
            .unwrap();
        let info = service.inspect_token(&token.access_token).await.unwrap();
        assert!(!info.expired);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_requires_password() {
        let service =
            AuthService::new(Arc::new(MemoryAuthStore::new()), Some("s".into()), None).unwrap();
        assert!(matches!(
            service.bootstrap_admin().await,
            Err(AuthError::AdminPasswordNotFound)
        ));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let service = service().await;
        let err = service
            .issue_token(TokenRequest::login("admin", "nope", vec![], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidPassword));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let service = service().await;
        let err = service
            .issue_token(TokenRequest::delegated("ghost", vec![], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_ungranted_scope() {
        let service = service().await;
        let bob = service.create_user("bob", "pw").await.unwrap();
        service
            .grant_scopes(&bob, &[ScopeName::ReadTasks])
            .await
            .unwrap();

        let err = service
            .issue_token(TokenRequest::login("bob", "pw", vec!["write:targets".into()], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ScopeNotFoundInUserScopes(s) if s == "write:targets"));
    }

    #[tokio::test]
    async fn test_missing_required_scope() {
        let service = service().await;
        let token = service
            .issue_token(TokenRequest::login("admin", "admin-pw", vec!["read:tasks".into()], 1))
            .await
            .unwrap();

        let err = service
            .validate_token(&token.access_token, &[ScopeName::WriteTargets])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ScopeNotProvided(s) if s == "write:targets"));
        assert_eq!(
            AuthError::ScopeNotProvided("write:targets".into()).to_string(),
            "scope 'write:targets' not allowed"
        );
    }

    #[tokio::test]
    async fn test_tampered_token() {
        let service = service().await;
        let token = service
            .issue_token(TokenRequest::login("admin", "admin-pw", vec![], 1))
            .await
            .unwrap();
        let tampered = format!("{}x", token.access_token);

        assert!(matches!(
            service.validate_token(&tampered, &[]).await,
            Err(AuthError::InvalidTokenFormat(_))
        ));
        assert!(matches!(
            service.validate_token("not-a-jwt", &[]).await,
            Err(AuthError::InvalidTokenFormat(_))
        ));
    }

    fn expired_token(service: &AuthService, user_id: i64) -> String {
        let claims = TokenClaims {
            sub: format!("user_{user_id}_00"),
            username: "admin".into(),
            scopes: vec!["read:token".into()],
            exp: (Utc::now() - Duration::minutes(5)).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(service.secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_but_inspectable() {
        let service = service().await;
        let admin = service
            .store()
            .get_user_by_username("admin")
            .await
            .unwrap()
            .unwrap();
        let token = expired_token(&service, admin.id);

        assert!(matches!(
            service.validate_token(&token, &[]).await,
            Err(AuthError::InvalidTokenFormat(_))
        ));

        let info = service.inspect_token(&token).await.unwrap();
        assert!(info.expired);
        assert_eq!(info.username, "admin");
        assert_eq!(info.scopes, vec!["read:token"]);
    }

    #[tokio::test]
    async fn test_subject_must_match_user() {
        let service = service().await;
        let token = expired_token(&service, 999);
        let info = service.inspect_token(&token).await.unwrap();
        assert_eq!(info.username, "admin");

        let claims = TokenClaims {
            sub: "user_999_00".into(),
            username: "admin".into(),
            scopes: vec![],
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(service.secret.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            service.validate_token(&forged, &[]).await,
            Err(AuthError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_secret_is_rejected() {
        let service = service().await;
        let other = AuthService::new(
            Arc::new(MemoryAuthStore::new()),
            Some("other-secret".into()),
            Some("admin-pw".into()),
        )
        .unwrap()
        .with_hasher(Hasher::with_cost(8, 1).unwrap());
        other.bootstrap_admin().await.unwrap();

        let token = other
            .issue_token(TokenRequest::login("admin", "admin-pw", vec![], 1))
            .await
            .unwrap();
        assert!(service.validate_token(&token.access_token, &[]).await.is_err());
    }
}
