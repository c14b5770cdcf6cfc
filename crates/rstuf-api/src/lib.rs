//! # RSTUF API
//!
//! Control plane of the Repository Service for TUF. The API never touches
//! metadata itself: it validates requests, checks the repository lifecycle
//! and hands work to the worker through a task broker.
//!
//! ## Components
//!
//! - **Settings store** ([`settings`]): shared key/value settings with a
//!   local YAML mirror, read by every precondition check
//! - **Task dispatcher** ([`broker`]): submits `{action, payload}` envelopes
//!   and reads task results back
//! - **Bootstrap coordinator** ([`bootstrap`]): at most one bootstrap at a
//!   time, with a supervisor that releases the lock on failure or timeout
//! - **HTTP API** ([`api`]): scope-checked handlers under `/api/v1`
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET|POST /api/v1/bootstrap` - Bootstrap state and initial metadata
//! - `POST /api/v1/artifacts`, `/artifacts/delete`, `/artifacts/publish`
//! - `POST /api/v1/metadata`, `/metadata/online`
//! - `GET|POST /api/v1/metadata/sign`, `POST /metadata/sign/delete`
//! - `POST|PUT /api/v1/delegations`, `POST /delegations/delete`
//! - `GET|PUT /api/v1/config`
//! - `GET /api/v1/task?task_id=`
//! - `POST /api/v1/token`, `POST /token/new`, `GET /token?token=`

pub mod api;
pub mod bootstrap;
pub mod broker;
pub mod config;
pub mod settings;

pub use api::create_router;
pub use api::error::ApiError;
pub use api::state::AppState;
pub use bootstrap::{BootstrapCoordinator, CoordinatorError, SupervisionOutcome};
pub use broker::{Broker, BrokerError, MemoryBroker, TaskDispatcher};
pub use config::{ApiConfig, ConfigError};
pub use settings::{LocalMirror, MemorySettings, SettingsBackend, SettingsError, SettingsStore};
