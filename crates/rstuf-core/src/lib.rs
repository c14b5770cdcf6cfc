//! # RSTUF Core
//!
//! Domain types shared by the Repository Service for TUF control plane.
//! Nothing in this crate performs I/O; the API crate feeds it values read
//! from the settings store and the broker.
//!
//! ## Key Concepts
//!
//! - **Role**: one of the fixed TUF roles, partitioned into online and
//!   offline roles by the `TARGETS_ONLINE_KEY` setting
//! - **Bootstrap state**: the lifecycle of the repository's first metadata,
//!   derived from the single `BOOTSTRAP` setting
//! - **Payload**: the schema of every mutating request, validated field by
//!   field before anything is sent to the worker
//! - **Task**: the `{action, payload}` envelope handed to the worker and the
//!   normalized view of its result

pub mod bootstrap;
pub mod metadata;
pub mod payload;
pub mod roles;
pub mod task;
pub mod validation;

pub use bootstrap::{BootstrapPhase, BootstrapState};
pub use metadata::{is_vendor_extension, Key, Signature, Signed, TufMetadata};
pub use roles::{offline_roles, online_roles, ParseRoleError, Role, RoleKeys};
pub use task::{
    TaskAction, TaskEnvelope, TaskId, TaskOutcome, TaskQueue, TaskResultView, TaskState, TaskView,
};
pub use validation::{FieldError, Validate, ValidationErrors, Validator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
