//! In-memory auth backend
//!
//! Data is lost on restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use super::{ScopeRepo, StorageError, UserRepo, UserScopeRepo};
use crate::types::{Scope, User, UserScope};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    scopes: BTreeMap<i64, Scope>,
    grants: BTreeSet<UserScope>,
    next_user_id: i64,
    next_scope_id: i64,
}

/// In-memory auth store
#[derive(Debug, Default)]
pub struct MemoryAuthStore {
    tables: RwLock<Tables>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables
            .read()
            .map_err(|_| StorageError::Database("auth tables lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Database("auth tables lock poisoned".into()))
    }
}

#[async_trait]
impl UserRepo for MemoryAuthStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StorageError> {
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.username == username) {
            return Err(StorageError::AlreadyExists(username.to_string()));
        }
        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        info!(user_id = user.id, username = %username, "Created user");
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("user {id}")))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }
}

#[async_trait]
impl ScopeRepo for MemoryAuthStore {
    async fn create_scope(&self, name: &str, description: &str) -> Result<Scope, StorageError> {
        let mut tables = self.write()?;
        if tables.scopes.values().any(|s| s.name == name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        tables.next_scope_id += 1;
        let scope = Scope {
            id: tables.next_scope_id,
            name: name.to_string(),
            description: description.to_string(),
        };
        tables.scopes.insert(scope.id, scope.clone());
        Ok(scope)
    }

    async fn get_scope_by_name(&self, name: &str) -> Result<Option<Scope>, StorageError> {
        Ok(self
            .read()?
            .scopes
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn list_scopes(&self) -> Result<Vec<Scope>, StorageError> {
        Ok(self.read()?.scopes.values().cloned().collect())
    }
}

#[async_trait]
impl UserScopeRepo for MemoryAuthStore {
    async fn grant_scope(&self, user_id: i64, scope_id: i64) -> Result<UserScope, StorageError> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&user_id) {
            return Err(StorageError::NotFound(format!("user {user_id}")));
        }
        if !tables.scopes.contains_key(&scope_id) {
            return Err(StorageError::NotFound(format!("scope {scope_id}")));
        }
        let grant = UserScope { user_id, scope_id };
        if !tables.grants.insert(grant) {
            return Err(StorageError::AlreadyExists(format!(
                "user {user_id} scope {scope_id}"
            )));
        }
        Ok(grant)
    }

    async fn user_scopes(&self, user_id: i64) -> Result<Vec<Scope>, StorageError> {
        let tables = self.read()?;
        let mut scopes: Vec<Scope> = tables
            .grants
            .iter()
            .filter(|g| g.user_id == user_id)
            .filter_map(|g| tables.scopes.get(&g.scope_id).cloned())
            .collect();
        scopes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(scopes)
    }

    async fn revoke_scope(&self, user_id: i64, scope_id: i64) -> Result<bool, StorageError> {
        Ok(self.write()?.grants.remove(&UserScope { user_id, scope_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_usernames_are_unique() {
        let store = MemoryAuthStore::new();
        store.create_user("admin", "h1").await.unwrap();

        let err = store.create_user("admin", "h2").await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_grants() {
        let store = MemoryAuthStore::new();
        let user = store.create_user("alice", "h").await.unwrap();
        let write = store.create_scope("write:targets", "w").await.unwrap();
        let read = store.create_scope("read:tasks", "r").await.unwrap();

        store.grant_scope(user.id, write.id).await.unwrap();
        store.grant_scope(user.id, read.id).await.unwrap();
        assert!(matches!(
            store.grant_scope(user.id, read.id).await,
            Err(StorageError::AlreadyExists(_))
        ));

        let names: Vec<_> = store
            .user_scopes(user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["read:tasks", "write:targets"]);

        assert!(store.revoke_scope(user.id, read.id).await.unwrap());
        assert!(!store.revoke_scope(user.id, read.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_requires_existing_rows() {
        let store = MemoryAuthStore::new();
        let scope = store.create_scope("read:tasks", "r").await.unwrap();
        assert!(matches!(
            store.grant_scope(42, scope.id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_password() {
        let store = MemoryAuthStore::new();
        let user = store.create_user("bob", "old").await.unwrap();
        store.update_password(user.id, "new").await.unwrap();

        let loaded = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.password_hash, "new");
        assert!(store.update_password(99, "x").await.is_err());
    }
}
