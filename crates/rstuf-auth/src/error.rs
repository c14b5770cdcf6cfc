//! Error types for the auth core

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised by the auth core
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Scope already exists: {0}")]
    ScopeAlreadyExists(String),

    #[error("Invalid password")]
    InvalidPassword,

    /// A token was requested for a scope the user was never granted
    #[error("Scope '{0}' not found in user scopes")]
    ScopeNotFoundInUserScopes(String),

    /// A valid token lacks the scope an endpoint requires
    #[error("scope '{0}' not allowed")]
    ScopeNotProvided(String),

    /// Requested lifetime is zero or above [`MAX_EXPIRES_HOURS`](crate::MAX_EXPIRES_HOURS)
    #[error("Invalid token expiration: {0} hours")]
    InvalidExpiration(u32),

    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    #[error("Secret key not found")]
    SecretKeyNotFound,

    #[error("Admin password not found")]
    AdminPasswordNotFound,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidTokenFormat(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        AuthError::Internal(format!("password hashing task failed: {err}"))
    }
}
