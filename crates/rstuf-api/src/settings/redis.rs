//! Redis settings backend
//!
//! Settings are fields of the `RSTUF_SETTINGS` hash; each value is stored as
//! its JSON encoding. Fields written by other tools that are not valid JSON
//! are read back as plain strings.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::info;

use super::{SettingsBackend, SettingsError};

pub const SETTINGS_HASH: &str = "RSTUF_SETTINGS";

// An empty string stands for "absent": JSON encodings are never empty.
const COMPARE_AND_SET: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if not current then current = '' end
if current ~= ARGV[2] then return 0 end
if ARGV[3] == '' then
    redis.call('HDEL', KEYS[1], ARGV[1])
else
    redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
end
return 1
"#;

impl From<redis::RedisError> for SettingsError {
    fn from(err: redis::RedisError) -> Self {
        SettingsError::Unavailable(err.to_string())
    }
}

#[derive(Clone)]
pub struct RedisSettings {
    conn: ConnectionManager,
    hash: String,
}

impl fmt::Debug for RedisSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSettings")
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

impl RedisSettings {
    /// Connect to `url`, e.g. `redis://redis:6379/0`
    pub async fn connect(url: &str) -> Result<Self, SettingsError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url = %url, "Connected to Redis settings store");
        Ok(Self {
            conn,
            hash: SETTINGS_HASH.to_string(),
        })
    }

    fn decode(raw: String) -> Value {
        serde_json::from_str(&raw).unwrap_or(Value::String(raw))
    }

    fn encode(value: Option<&Value>) -> Result<String, SettingsError> {
        match value {
            Some(v) => Ok(serde_json::to_string(v)?),
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl SettingsBackend for RedisSettings {
    async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(&self.hash, key).await?;
        Ok(raw.map(Self::decode))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), SettingsError> {
        let mut conn = self.conn.clone();
        let encoded = serde_json::to_string(value)?;
        let _: () = conn.hset(&self.hash, key, encoded).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SettingsError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(&self.hash, key).await?;
        Ok(())
    }

    async fn all(&self) -> Result<BTreeMap<String, Value>, SettingsError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(&self.hash).await?;
        Ok(raw
            .into_iter()
            .map(|(key, value)| (key, Self::decode(value)))
            .collect())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<bool, SettingsError> {
        let mut conn = self.conn.clone();
        let swapped: i32 = Script::new(COMPARE_AND_SET)
            .key(&self.hash)
            .arg(key)
            .arg(Self::encode(expected)?)
            .arg(Self::encode(new)?)
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }
}
