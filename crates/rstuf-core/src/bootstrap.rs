//! Bootstrap state derivation
//!
//! The whole lifecycle lives in one settings value:
//!
//! | Raw value        | bootstrap | state      | task id |
//! |------------------|-----------|------------|---------|
//! | unset            | false     | absent     | -       |
//! | `pre-<id>`       | false     | `pre`      | `<id>`  |
//! | `signing-<id>`   | false     | `signing`  | `<id>`  |
//! | `<id>`           | true      | `finished` | `<id>`  |

use serde::{Deserialize, Serialize};
use std::fmt;

const PRE_PREFIX: &str = "pre-";
const SIGNING_PREFIX: &str = "signing-";

/// Non-absent bootstrap phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapPhase {
    /// Lock acquired, worker task dispatched
    Pre,
    /// Worker waits for offline (DAS) signatures
    Signing,
    /// Repository metadata exists
    Finished,
}

impl BootstrapPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapPhase::Pre => "pre",
            BootstrapPhase::Signing => "signing",
            BootstrapPhase::Finished => "finished",
        }
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived view of the `BOOTSTRAP` setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapState {
    pub bootstrap: bool,
    /// `None` while no bootstrap was ever accepted
    pub state: Option<BootstrapPhase>,
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl BootstrapState {
    pub fn absent() -> Self {
        Self {
            bootstrap: false,
            state: None,
            task_id: None,
        }
    }

    /// Derive the state from the raw setting
    pub fn from_setting(raw: Option<&str>) -> Self {
        let raw = match raw {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Self::absent(),
        };

        if let Some(id) = raw.strip_prefix(PRE_PREFIX) {
            Self::locked(BootstrapPhase::Pre, id)
        } else if let Some(id) = raw.strip_prefix(SIGNING_PREFIX) {
            Self::locked(BootstrapPhase::Signing, id)
        } else {
            Self {
                bootstrap: true,
                state: Some(BootstrapPhase::Finished),
                task_id: Some(raw.to_string()),
            }
        }
    }

    fn locked(phase: BootstrapPhase, id: &str) -> Self {
        Self {
            bootstrap: false,
            state: Some(phase),
            task_id: Some(id.to_string()),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.state.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.bootstrap && self.state == Some(BootstrapPhase::Finished)
    }

    pub fn is_signing(&self) -> bool {
        self.state == Some(BootstrapPhase::Signing)
    }

    /// A bootstrap exists or is being acquired
    pub fn is_locked(&self) -> bool {
        self.bootstrap
            || matches!(
                self.state,
                Some(BootstrapPhase::Pre) | Some(BootstrapPhase::Signing)
            )
    }

    /// Short state name used in conflict messages
    pub fn describe(&self) -> &'static str {
        self.state.map(|s| s.as_str()).unwrap_or("absent")
    }
}

/// Setting value that marks the lock as held by `task_id`
pub fn pre_lock_value(task_id: &str) -> String {
    format!("{PRE_PREFIX}{task_id}")
}

/// Setting value the worker writes while waiting for signatures
pub fn signing_value(task_id: &str) -> String {
    format!("{SIGNING_PREFIX}{task_id}")
}
