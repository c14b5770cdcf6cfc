//! SQLite auth backend
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: SQLite connection string, e.g.
//!   `sqlite:///data/users.sqlite`. The file is created when missing.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use super::{ScopeRepo, StorageError, UserRepo, UserScopeRepo};
use crate::types::{Scope, User, UserScope};

const MIGRATIONS: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS rstuf_users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rstuf_scopes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rstuf_user_scopes (
        user_id INTEGER NOT NULL REFERENCES rstuf_users(id) ON DELETE CASCADE,
        scope_id INTEGER NOT NULL REFERENCES rstuf_scopes(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, scope_id)
    )
    "#,
];

/// SQLite auth store
#[derive(Debug, Clone)]
pub struct SqliteAuthStore {
    pool: SqlitePool,
}

impl SqliteAuthStore {
    /// Connect (creating the database file if needed) and run migrations
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!("Connected to SQLite database");

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }
        info!("Database migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn insert_error(err: sqlx::Error, what: String) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::AlreadyExists(what),
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound(what),
        _ => StorageError::Database(err.to_string()),
    }
}

fn db_error(err: sqlx::Error) -> StorageError {
    StorageError::Database(err.to_string())
}

fn user_from_row(r: &SqliteRow) -> User {
    User {
        id: r.get("id"),
        username: r.get("username"),
        password_hash: r.get("password"),
        created_at: r.get("created_at"),
    }
}

fn scope_from_row(r: &SqliteRow) -> Scope {
    Scope {
        id: r.get("id"),
        name: r.get("name"),
        description: r.get("description"),
    }
}

#[async_trait]
impl UserRepo for SqliteAuthStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StorageError> {
        let created_at = chrono::Utc::now();
        let result = sqlx::query(
            "INSERT INTO rstuf_users (username, password, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, username.to_string()))?;

        let user = User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        };
        info!(user_id = user.id, username = %username, "Created user");
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(
            "SELECT id, username, password, created_at FROM rstuf_users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(
            "SELECT id, username, password, created_at FROM rstuf_users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let rows = sqlx::query("SELECT id, username, password, created_at FROM rstuf_users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE rstuf_users SET password = ?1 WHERE id = ?2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("user {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ScopeRepo for SqliteAuthStore {
    async fn create_scope(&self, name: &str, description: &str) -> Result<Scope, StorageError> {
        let result = sqlx::query("INSERT INTO rstuf_scopes (name, description) VALUES (?1, ?2)")
            .bind(name)
            .bind(description)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(e, name.to_string()))?;

        Ok(Scope {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    async fn get_scope_by_name(&self, name: &str) -> Result<Option<Scope>, StorageError> {
        let row = sqlx::query("SELECT id, name, description FROM rstuf_scopes WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.as_ref().map(scope_from_row))
    }

    async fn list_scopes(&self) -> Result<Vec<Scope>, StorageError> {
        let rows = sqlx::query("SELECT id, name, description FROM rstuf_scopes ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.iter().map(scope_from_row).collect())
    }
}

#[async_trait]
impl UserScopeRepo for SqliteAuthStore {
    async fn grant_scope(&self, user_id: i64, scope_id: i64) -> Result<UserScope, StorageError> {
        sqlx::query("INSERT INTO rstuf_user_scopes (user_id, scope_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(scope_id)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(e, format!("user {user_id} scope {scope_id}")))?;
        Ok(UserScope { user_id, scope_id })
    }

    async fn user_scopes(&self, user_id: i64) -> Result<Vec<Scope>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.name, s.description
            FROM rstuf_scopes s
            JOIN rstuf_user_scopes us ON us.scope_id = s.id
            WHERE us.user_id = ?1
            ORDER BY s.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(scope_from_row).collect())
    }

    async fn revoke_scope(&self, user_id: i64, scope_id: i64) -> Result<bool, StorageError> {
        let result =
            sqlx::query("DELETE FROM rstuf_user_scopes WHERE user_id = ?1 AND scope_id = ?2")
                .bind(user_id)
                .bind(scope_id)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }
}
