//! Local YAML mirror of the shared settings
//!
//! A flat mapping of setting name to value, rewritten in full on every
//! change. Writes go to a sibling temporary file that is then renamed over
//! the mirror, so a crash never leaves a truncated file behind.

use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::SettingsError;

#[derive(Debug, Clone)]
pub struct LocalMirror {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Arc<Mutex<()>>,
}

impl LocalMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Contents of the mirror; empty when the file does not exist yet
    pub async fn load(&self) -> Result<BTreeMap<String, Value>, SettingsError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Set (or with `None`, remove) one key
    pub async fn store(&self, key: &str, value: Option<&Value>) -> Result<(), SettingsError> {
        let _guard = self.lock.lock().await;
        let mut contents = self.read().await?;
        match value {
            Some(v) => contents.insert(key.to_string(), v.clone()),
            None => contents.remove(key),
        };
        self.write(&contents).await
    }

    async fn read(&self) -> Result<BTreeMap<String, Value>, SettingsError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(SettingsError::Io(format!("{}: {e}", self.path.display()))),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_yaml::from_str(&raw).map_err(|e| {
            SettingsError::Serialization(format!("{}: {e}", self.path.display()))
        })
    }

    async fn write(&self, contents: &BTreeMap<String, Value>) -> Result<(), SettingsError> {
        let yaml = serde_yaml::to_string(contents)
            .map_err(|e| SettingsError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SettingsError::Io(format!("{}: {e}", parent.display())))?;
        }
        let tmp = self.path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, yaml)
            .await
            .map_err(|e| SettingsError::Io(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SettingsError::Io(format!("{}: {e}", self.path.display())))
    }
}
