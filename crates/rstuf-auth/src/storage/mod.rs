//! Storage abstraction for users, scopes and grants
//!
//! Three repositories back the auth core: users, the scope catalogue and
//! the user-scope grants joining them. A backend implements all three and
//! is used through the [`AuthStore`] supertrait.
//!
//! The in-memory backend is the default for tests and single-process
//! deployments. The SQLite backend (feature `sqlite`) is what the service
//! runs with, so accounts survive restarts.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryAuthStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAuthStore;

use async_trait::async_trait;
use std::fmt::Debug;

use crate::types::{Scope, User, UserScope};

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a user; `AlreadyExists` when the username is taken
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StorageError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;

    async fn list_users(&self) -> Result<Vec<User>, StorageError>;

    /// Replace a user's password hash; `NotFound` for unknown ids
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ScopeRepo: Send + Sync {
    /// Insert a scope; `AlreadyExists` when the name is taken
    async fn create_scope(&self, name: &str, description: &str) -> Result<Scope, StorageError>;

    async fn get_scope_by_name(&self, name: &str) -> Result<Option<Scope>, StorageError>;

    async fn list_scopes(&self) -> Result<Vec<Scope>, StorageError>;
}

#[async_trait]
pub trait UserScopeRepo: Send + Sync {
    /// Grant a scope to a user; `AlreadyExists` when already granted
    async fn grant_scope(&self, user_id: i64, scope_id: i64) -> Result<UserScope, StorageError>;

    /// Scopes granted to a user, ordered by name
    async fn user_scopes(&self, user_id: i64) -> Result<Vec<Scope>, StorageError>;

    /// Returns whether a grant was removed
    async fn revoke_scope(&self, user_id: i64, scope_id: i64) -> Result<bool, StorageError>;
}

/// A complete auth backend
pub trait AuthStore: UserRepo + ScopeRepo + UserScopeRepo + Debug {}

impl<T> AuthStore for T where T: UserRepo + ScopeRepo + UserScopeRepo + Debug {}
