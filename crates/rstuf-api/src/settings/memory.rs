//! In-memory settings backend
//!
//! Used by tests and by deployments without a shared store. Data is lost on
//! restart unless a local mirror re-hydrates it.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{SettingsBackend, SettingsError};

#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Value>>, SettingsError> {
        self.values
            .read()
            .map_err(|_| SettingsError::Unavailable("settings lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Value>>, SettingsError> {
        self.values
            .write()
            .map_err(|_| SettingsError::Unavailable("settings lock poisoned".into()))
    }
}

#[async_trait]
impl SettingsBackend for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), SettingsError> {
        self.write()?.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SettingsError> {
        self.write()?.remove(key);
        Ok(())
    }

    async fn all(&self) -> Result<BTreeMap<String, Value>, SettingsError> {
        Ok(self.read()?.clone())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<bool, SettingsError> {
        let mut values = self.write()?;
        if values.get(key) != expected {
            return Ok(false);
        }
        match new {
            Some(value) => values.insert(key.to_string(), value.clone()),
            None => values.remove(key),
        };
        Ok(true)
    }
}
