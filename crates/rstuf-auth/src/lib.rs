//! Authentication and authorization core
//!
//! Users authenticate with a password once and receive an HS256-signed
//! bearer token carrying the scopes they asked for. Every protected endpoint
//! then validates the token and checks that it carries the scope the
//! endpoint requires.
//!
//! ## Components
//!
//! - **Storage**: `UserRepo`, `ScopeRepo` and `UserScopeRepo`, implemented
//!   in memory and (feature `sqlite`) on SQLite
//! - **Passwords**: Argon2id hashing and verification
//! - **Service**: the [`AuthenticationService`] trait with the production
//!   [`AuthService`] and the test-only [`MockAuthService`]
//!
//! ## Usage
//!
//! ```ignore
//! use rstuf_auth::{AuthService, AuthenticationService, MemoryAuthStore, ScopeName, TokenRequest};
//!
//! let auth = AuthService::new(Arc::new(MemoryAuthStore::new()), Some(secret), Some(admin_pw))?;
//! auth.bootstrap_admin().await?;
//!
//! let token = auth.issue_token(TokenRequest::login("admin", admin_pw, vec!["write:targets".into()], 1)).await?;
//! let claims = auth.validate_token(&token.access_token, &[ScopeName::WriteTargets]).await?;
//! ```

pub mod error;
pub mod mock;
pub mod password;
pub mod service;
pub mod storage;
pub mod types;

pub use error::{AuthError, Result};
pub use mock::MockAuthService;
pub use password::Hasher;
pub use service::{
    AuthService, AuthenticationService, TokenRequest, ADMIN_USERNAME, MAX_EXPIRES_HOURS,
};
pub use storage::{AuthStore, MemoryAuthStore, ScopeRepo, StorageError, UserRepo, UserScopeRepo};
#[cfg(feature = "sqlite")]
pub use storage::SqliteAuthStore;
pub use types::{ParseScopeError, Scope, ScopeName, Token, TokenClaims, TokenInfo, User, UserScope};
