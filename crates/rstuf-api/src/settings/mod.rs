//! Repository settings store
//!
//! Settings live in a shared key-value store so every API instance and the
//! worker see the same values. Every successful write is also copied to a
//! local YAML mirror, best effort; when the shared store comes up empty (a
//! restarted, volatile Redis) but the mirror still records a bootstrap, the
//! mirror is copied back into the shared store.
//!
//! Values are JSON. Handlers that make admission decisions read with
//! [`SettingsStore::get_fresh`]; [`SettingsStore::get`] may serve a value
//! cached by an earlier read or write of this process.

pub mod file;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use file::LocalMirror;
pub use memory::MemorySettings;
#[cfg(feature = "redis")]
pub use self::redis::RedisSettings;

use async_trait::async_trait;
use rstuf_core::roles::{BOOTSTRAP_KEY, SIGNING_SUFFIX, TARGETS_ONLINE_KEY};
use rstuf_core::{BootstrapState, RoleKeys};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),

    #[error("Settings serialization error: {0}")]
    Serialization(String),

    #[error("Settings mirror error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::Serialization(err.to_string())
    }
}

/// Shared key-value layer
#[async_trait]
pub trait SettingsBackend: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError>;

    async fn set(&self, key: &str, value: &Value) -> Result<(), SettingsError>;

    async fn delete(&self, key: &str) -> Result<(), SettingsError>;

    async fn all(&self) -> Result<BTreeMap<String, Value>, SettingsError>;

    /// Atomically replace `key` if it currently holds `expected`
    ///
    /// `None` stands for an absent key on both sides. Returns whether the
    /// swap happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<bool, SettingsError>;
}

/// Settings store adapter
#[derive(Debug)]
pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    mirror: Option<LocalMirror>,
    cache: RwLock<BTreeMap<String, Value>>,
}

impl SettingsStore {
    /// Open the store, re-hydrating an empty backend from the mirror
    pub async fn open(
        backend: Arc<dyn SettingsBackend>,
        mirror: Option<LocalMirror>,
    ) -> Result<Self, SettingsError> {
        let store = Self {
            backend,
            mirror,
            cache: RwLock::new(BTreeMap::new()),
        };
        store.rehydrate().await?;
        store.reload().await?;
        Ok(store)
    }

    /// Store without a mirror over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemorySettings::new()),
            mirror: None,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    async fn rehydrate(&self) -> Result<(), SettingsError> {
        let Some(mirror) = &self.mirror else {
            return Ok(());
        };
        if !self.backend.all().await?.is_empty() {
            return Ok(());
        }
        let saved = mirror.load().await?;
        let has_bootstrap = saved.get(BOOTSTRAP_KEY).is_some_and(|v| !v.is_null());
        if !has_bootstrap {
            return Ok(());
        }

        warn!(
            path = %mirror.path().display(),
            keys = saved.len(),
            "Settings store is empty; restoring from local mirror"
        );
        for (key, value) in &saved {
            if !value.is_null() {
                self.backend.set(key, value).await?;
            }
        }
        Ok(())
    }

    fn cached(&self, key: &str) -> Option<Value> {
        self.cache.read().ok().and_then(|c| c.get(key).cloned())
    }

    fn remember(&self, key: &str, value: Option<&Value>) {
        if let Ok(mut cache) = self.cache.write() {
            match value {
                Some(v) => cache.insert(key.to_string(), v.clone()),
                None => cache.remove(key),
            };
        }
    }

    /// Read a value, serving it from the process cache when present
    pub async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        match self.cached(key) {
            Some(value) => Ok(Some(value)),
            None => self.get_fresh(key).await,
        }
    }

    /// Read a value from the shared store
    pub async fn get_fresh(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        let value = self.backend.get(key).await?.filter(|v| !v.is_null());
        self.remember(key, value.as_ref());
        Ok(value)
    }

    /// Read a value from the shared store, falling back to `default`
    pub async fn get_fresh_or(&self, key: &str, default: Value) -> Result<Value, SettingsError> {
        Ok(self.get_fresh(key).await?.unwrap_or(default))
    }

    /// Write (or with `None`, remove) a value: shared store first, then mirror
    pub async fn put(&self, key: &str, value: Option<Value>) -> Result<(), SettingsError> {
        match value.as_ref().filter(|v| !v.is_null()) {
            Some(v) => self.backend.set(key, v).await?,
            None => self.backend.delete(key).await?,
        }
        debug!(key = %key, "Updated setting");
        self.written(key, value.as_ref().filter(|v| !v.is_null())).await;
        Ok(())
    }

    /// Atomic conditional write; see [`SettingsBackend::compare_and_set`]
    pub async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool, SettingsError> {
        let new = new.filter(|v| !v.is_null());
        let swapped = self
            .backend
            .compare_and_set(key, expected, new.as_ref())
            .await?;
        if swapped {
            self.written(key, new.as_ref()).await;
        }
        Ok(swapped)
    }

    async fn written(&self, key: &str, value: Option<&Value>) {
        self.remember(key, value);
        // The backend already holds the value, so a mirror failure is logged and not returned.
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.store(key, value).await {
                warn!(key = %key, error = %e, "Failed to update local settings mirror");
            }
        }
    }

    /// Replace the process cache with the shared store's contents
    pub async fn reload(&self) -> Result<(), SettingsError> {
        let all = self.backend.all().await?;
        info!(keys = all.len(), "Loaded repository settings");
        if let Ok(mut cache) = self.cache.write() {
            *cache = all;
        }
        Ok(())
    }

    /// Every setting currently in the shared store
    pub async fn snapshot(&self) -> Result<BTreeMap<String, Value>, SettingsError> {
        let mut all = self.backend.all().await?;
        all.retain(|_, v| !v.is_null());
        Ok(all)
    }

    // =========================================================================
    // Typed accessors
    // =========================================================================

    /// Raw `BOOTSTRAP` value, fresh from the shared store
    pub async fn bootstrap_raw(&self) -> Result<Option<Value>, SettingsError> {
        self.get_fresh(BOOTSTRAP_KEY).await
    }

    pub async fn bootstrap_state(&self) -> Result<BootstrapState, SettingsError> {
        let raw = self.bootstrap_raw().await?;
        Ok(BootstrapState::from_setting(raw.as_ref().and_then(Value::as_str)))
    }

    /// `TARGETS_ONLINE_KEY`, defaulting to true
    pub async fn targets_online_key(&self) -> Result<bool, SettingsError> {
        Ok(match self.get_fresh(TARGETS_ONLINE_KEY).await? {
            Some(Value::Bool(flag)) => flag,
            Some(Value::String(s)) => !matches!(s.to_ascii_lowercase().as_str(), "false" | "0" | "no"),
            _ => true,
        })
    }

    /// Draft metadata awaiting signatures for `role`
    pub async fn role_signing(&self, role: &str) -> Result<Option<Value>, SettingsError> {
        self.get_fresh(&RoleKeys::for_name(role).signing).await
    }

    /// Last trusted metadata of `role`
    pub async fn role_trusted(&self, role: &str) -> Result<Option<Value>, SettingsError> {
        self.get_fresh(&RoleKeys::for_name(role).trusted).await
    }

    /// Every `<ROLE>_SIGNING` draft, keyed by setting name
    pub async fn pending_signing(&self) -> Result<BTreeMap<String, Value>, SettingsError> {
        let mut all = self.snapshot().await?;
        all.retain(|key, _| key.ends_with(SIGNING_SUFFIX));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = SettingsStore::in_memory();
        store.put("ROOT_EXPIRATION", Some(json!(365))).await.unwrap();

        assert_eq!(store.get("ROOT_EXPIRATION").await.unwrap(), Some(json!(365)));
        assert_eq!(store.get_fresh("ROOT_EXPIRATION").await.unwrap(), Some(json!(365)));

        store.put("ROOT_EXPIRATION", None).await.unwrap();
        assert_eq!(store.get_fresh("ROOT_EXPIRATION").await.unwrap(), None);
        assert_eq!(
            store.get_fresh_or("ROOT_EXPIRATION", json!(1)).await.unwrap(),
            json!(1)
        );
    }

    #[tokio::test]
    async fn test_get_fresh_sees_foreign_writes() {
        let backend = Arc::new(MemorySettings::new());
        let store = SettingsStore::open(backend.clone(), None).await.unwrap();
        store.put("TIMESTAMP_EXPIRATION", Some(json!(1))).await.unwrap();

        backend.set("TIMESTAMP_EXPIRATION", &json!(2)).await.unwrap();

        assert_eq!(store.get("TIMESTAMP_EXPIRATION").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get_fresh("TIMESTAMP_EXPIRATION").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get("TIMESTAMP_EXPIRATION").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_reload_replaces_cache() {
        let backend = Arc::new(MemorySettings::new());
        let store = SettingsStore::open(backend.clone(), None).await.unwrap();
        store.put("A", Some(json!("old"))).await.unwrap();
        backend.delete("A").await.unwrap();

        store.reload().await.unwrap();
        assert_eq!(store.get("A").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bootstrap_state_accessor() {
        let store = SettingsStore::in_memory();
        assert!(store.bootstrap_state().await.unwrap().is_absent());

        store.put(BOOTSTRAP_KEY, Some(json!("signing-abc"))).await.unwrap();
        let state = store.bootstrap_state().await.unwrap();
        assert!(state.is_signing());
        assert_eq!(state.task_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_targets_online_key_default_and_forms() {
        let store = SettingsStore::in_memory();
        assert!(store.targets_online_key().await.unwrap());

        store.put(TARGETS_ONLINE_KEY, Some(json!(false))).await.unwrap();
        assert!(!store.targets_online_key().await.unwrap());

        store.put(TARGETS_ONLINE_KEY, Some(json!("False"))).await.unwrap();
        assert!(!store.targets_online_key().await.unwrap());

        store.put(TARGETS_ONLINE_KEY, Some(json!("true"))).await.unwrap();
        assert!(store.targets_online_key().await.unwrap());
    }

    #[tokio::test]
    async fn test_role_accessors() {
        let store = SettingsStore::in_memory();
        store.put("ROOT_SIGNING", Some(json!({"signed": {}}))).await.unwrap();
        store.put("TRUSTED_ROOT", Some(json!({"signed": {"version": 1}}))).await.unwrap();
        store.put("ROOT_EXPIRATION", Some(json!(365))).await.unwrap();

        assert!(store.role_signing("root").await.unwrap().is_some());
        assert!(store.role_trusted("root").await.unwrap().is_some());
        assert!(store.role_signing("targets").await.unwrap().is_none());

        let pending = store.pending_signing().await.unwrap();
        assert_eq!(pending.keys().collect::<Vec<_>>(), vec!["ROOT_SIGNING"]);
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = SettingsStore::in_memory();

        assert!(store
            .compare_and_set(BOOTSTRAP_KEY, None, Some(json!("pre-1")))
            .await
            .unwrap());
        assert!(!store
            .compare_and_set(BOOTSTRAP_KEY, None, Some(json!("pre-2")))
            .await
            .unwrap());
        assert_eq!(store.get(BOOTSTRAP_KEY).await.unwrap(), Some(json!("pre-1")));

        assert!(store
            .compare_and_set(BOOTSTRAP_KEY, Some(&json!("pre-1")), None)
            .await
            .unwrap());
        assert_eq!(store.get_fresh(BOOTSTRAP_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_writes_reach_the_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("repository_settings.yaml"));
        let store = SettingsStore::open(Arc::new(MemorySettings::new()), Some(mirror.clone()))
            .await
            .unwrap();

        store.put(BOOTSTRAP_KEY, Some(json!("abc"))).await.unwrap();
        store.put("TARGETS_EXPIRATION", Some(json!(365))).await.unwrap();
        store.put("TARGETS_EXPIRATION", None).await.unwrap();

        let saved = mirror.load().await.unwrap();
        assert_eq!(saved.get(BOOTSTRAP_KEY), Some(&json!("abc")));
        assert!(!saved.contains_key("TARGETS_EXPIRATION"));
    }

    #[tokio::test]
    async fn test_unwritable_mirror_does_not_fail_writes() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("settings");
        std::fs::create_dir(&parent).unwrap();
        let mirror = LocalMirror::new(parent.join("repository_settings.yaml"));
        let backend = Arc::new(MemorySettings::new());
        let store = SettingsStore::open(backend.clone(), Some(mirror.clone()))
            .await
            .unwrap();

        // Replace the mirror's directory with a plain file
        std::fs::remove_dir(&parent).unwrap();
        std::fs::write(&parent, b"").unwrap();
        assert!(mirror.store(BOOTSTRAP_KEY, Some(&json!("x"))).await.is_err());

        assert!(store
            .compare_and_set(BOOTSTRAP_KEY, None, Some(json!("pre-1")))
            .await
            .unwrap());
        assert_eq!(backend.get(BOOTSTRAP_KEY).await.unwrap(), Some(json!("pre-1")));

        assert!(store
            .compare_and_set(BOOTSTRAP_KEY, Some(&json!("pre-1")), None)
            .await
            .unwrap());
        assert_eq!(backend.get(BOOTSTRAP_KEY).await.unwrap(), None);

        store.put("ROOT_EXPIRATION", Some(json!(365))).await.unwrap();
        assert_eq!(store.get_fresh("ROOT_EXPIRATION").await.unwrap(), Some(json!(365)));
    }

    #[tokio::test]
    async fn test_empty_backend_is_rehydrated_from_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("repository_settings.yaml"));
        mirror.store(BOOTSTRAP_KEY, Some(&json!("abc"))).await.unwrap();
        mirror.store("ROOT_EXPIRATION", Some(&json!(365))).await.unwrap();

        let backend = Arc::new(MemorySettings::new());
        let store = SettingsStore::open(backend.clone(), Some(mirror)).await.unwrap();

        assert_eq!(backend.get(BOOTSTRAP_KEY).await.unwrap(), Some(json!("abc")));
        assert_eq!(store.get_fresh("ROOT_EXPIRATION").await.unwrap(), Some(json!(365)));
        assert!(store.bootstrap_state().await.unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_mirror_without_bootstrap_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("repository_settings.yaml"));
        mirror.store("ROOT_EXPIRATION", Some(&json!(365))).await.unwrap();

        let backend = Arc::new(MemorySettings::new());
        SettingsStore::open(backend.clone(), Some(mirror)).await.unwrap();
        assert!(backend.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_populated_backend_wins_over_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("repository_settings.yaml"));
        mirror.store(BOOTSTRAP_KEY, Some(&json!("old"))).await.unwrap();

        let backend = Arc::new(MemorySettings::new());
        backend.set(BOOTSTRAP_KEY, &json!("new")).await.unwrap();
        let store = SettingsStore::open(backend, Some(mirror)).await.unwrap();
        assert_eq!(store.get_fresh(BOOTSTRAP_KEY).await.unwrap(), Some(json!("new")));
    }
}
