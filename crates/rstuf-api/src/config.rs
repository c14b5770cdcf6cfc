//! Process configuration
//!
//! Read once from the environment at start-up and handed to the components
//! that need it.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

/// Prefix marking a value as a path to a Docker/Kubernetes secret file
pub const SECRETS_DIR: &str = "/run/secrets/";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} is required")]
    Missing { var: &'static str },

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read secret file {path}: {source}")]
    SecretFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub data_dir: PathBuf,
    pub database_url: String,
    /// Shared settings store; in-memory when unset
    pub redis_server: Option<String>,
    pub redis_port: u16,
    pub redis_db_data: u32,
    pub redis_db_result: u32,
    /// Broker transport; in-memory when unset
    pub broker_server: Option<String>,
    pub auth: bool,
    pub token_key: Option<String>,
    pub admin_password: Option<String>,
    pub port: u16,
    pub bootstrap_poll_interval: Duration,
    /// Maximum level of the `tracing` subscriber
    pub log_level: Level,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "/data".into()));
        let database_url = var("DATABASE_URL").unwrap_or_else(|| {
            format!("sqlite://{}", data_dir.join("users.sqlite").display())
        });

        let auth = match var("RSTUF_AUTH") {
            Some(value) => parse_bool("RSTUF_AUTH", &value)?,
            None => true,
        };

        let token_key = var("SECRETS_RSTUF_TOKEN_KEY").map(resolve_secret).transpose()?;
        let admin_password = var("SECRETS_RSTUF_ADMIN_PASSWORD")
            .map(resolve_secret)
            .transpose()?;
        if auth {
            if token_key.is_none() {
                return Err(ConfigError::Missing {
                    var: "SECRETS_RSTUF_TOKEN_KEY",
                });
            }
            if admin_password.is_none() {
                return Err(ConfigError::Missing {
                    var: "SECRETS_RSTUF_ADMIN_PASSWORD",
                });
            }
        }

        let poll_ms: u64 = parse_value(
            "RSTUF_BOOTSTRAP_POLL_INTERVAL_MS",
            var("RSTUF_BOOTSTRAP_POLL_INTERVAL_MS"),
            1000,
        )?;
        if poll_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "RSTUF_BOOTSTRAP_POLL_INTERVAL_MS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            data_dir,
            database_url,
            redis_server: var("RSTUF_REDIS_SERVER"),
            redis_port: parse_value("RSTUF_REDIS_SERVER_PORT", var("RSTUF_REDIS_SERVER_PORT"), 6379)?,
            redis_db_data: parse_value(
                "RSTUF_REDIS_SERVER_DB_DATA",
                var("RSTUF_REDIS_SERVER_DB_DATA"),
                0,
            )?,
            redis_db_result: parse_value(
                "RSTUF_REDIS_SERVER_DB_RESULT",
                var("RSTUF_REDIS_SERVER_DB_RESULT"),
                1,
            )?,
            broker_server: var("RSTUF_BROKER_SERVER"),
            auth,
            token_key,
            admin_password,
            port: parse_value("RSTUF_API_PORT", var("RSTUF_API_PORT"), 80)?,
            bootstrap_poll_interval: Duration::from_millis(poll_ms),
            log_level: parse_value("RSTUF_LOG_LEVEL", var("RSTUF_LOG_LEVEL"), Level::INFO)?,
        })
    }

    /// Local mirror of the shared settings
    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("repository_settings.yaml")
    }

    /// `redis://host:port/db` for one of the Redis databases
    pub fn redis_url(&self, db: u32) -> Option<String> {
        self.redis_server
            .as_ref()
            .map(|server| format!("{}:{}/{}", server.trim_end_matches('/'), self.redis_port, db))
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true/false, 1/0 or yes/no".into(),
        }),
    }
}

fn parse_value<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Resolve a secret that may be given inline or as a `/run/secrets/` path
///
/// Secret files have exactly one trailing newline removed.
pub fn resolve_secret(value: String) -> Result<String, ConfigError> {
    if !value.starts_with(SECRETS_DIR) {
        return Ok(value);
    }
    let contents = std::fs::read_to_string(&value).map_err(|source| ConfigError::SecretFile {
        path: value.clone(),
        source,
    })?;
    Ok(strip_newline(contents))
}

fn strip_newline(mut contents: String) -> String {
    if contents.ends_with('\n') {
        contents.pop();
        if contents.ends_with('\r') {
            contents.pop();
        }
    }
    contents
}
