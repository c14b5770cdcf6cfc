//! TUF role taxonomy
//!
//! The repository manages a fixed set of roles. `root` is always signed
//! offline by a human ceremony; `snapshot`, `timestamp` and `bins` are always
//! signed by the worker's online key; `targets` moves between the two
//! classes with the `TARGETS_ONLINE_KEY` setting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Settings key holding the bootstrap lock / completion marker
pub const BOOTSTRAP_KEY: &str = "BOOTSTRAP";

/// Settings key selecting whether `targets` is an online role
pub const TARGETS_ONLINE_KEY: &str = "TARGETS_ONLINE_KEY";

pub const SIGNING_SUFFIX: &str = "_SIGNING";
pub const TRUSTED_PREFIX: &str = "TRUSTED_";

/// A role from the fixed TUF taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    Targets,
    Snapshot,
    Timestamp,
    Bins,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Root,
        Role::Targets,
        Role::Snapshot,
        Role::Timestamp,
        Role::Bins,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::Targets => "targets",
            Role::Snapshot => "snapshot",
            Role::Timestamp => "timestamp",
            Role::Bins => "bins",
        }
    }

    /// Whether the worker may sign this role with its online key
    pub fn is_online(&self, targets_online_key: bool) -> bool {
        match self {
            Role::Root => false,
            Role::Targets => targets_online_key,
            Role::Snapshot | Role::Timestamp | Role::Bins => true,
        }
    }

    /// Settings keys owned by this role
    pub fn keys(&self) -> RoleKeys {
        RoleKeys::for_name(self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| ParseRoleError(s.to_string()))
    }
}

/// Roles the worker signs with its online key
///
/// Recomputed from the current setting on every call; never cache the result.
pub fn online_roles(targets_online_key: bool) -> BTreeSet<Role> {
    Role::ALL
        .iter()
        .copied()
        .filter(|r| r.is_online(targets_online_key))
        .collect()
}

/// Roles that require an offline signing ceremony
pub fn offline_roles(targets_online_key: bool) -> BTreeSet<Role> {
    Role::ALL
        .iter()
        .copied()
        .filter(|r| !r.is_online(targets_online_key))
        .collect()
}

/// The settings keys derived from a role name
///
/// Works for taxonomy roles and for delegated role names alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleKeys {
    /// Draft metadata awaiting threshold signatures (`<ROLE>_SIGNING`)
    pub signing: String,
    /// Last trusted metadata (`TRUSTED_<ROLE>`)
    pub trusted: String,
    /// Expiration in days (`<ROLE>_EXPIRATION`)
    pub expiration: String,
}

impl RoleKeys {
    pub fn for_name(name: &str) -> Self {
        let upper = name.to_uppercase();
        Self {
            signing: format!("{upper}{SIGNING_SUFFIX}"),
            trusted: format!("{TRUSTED_PREFIX}{upper}"),
            expiration: format!("{upper}_EXPIRATION"),
        }
    }
}

/// Recover the lower-case role name from a `<ROLE>_SIGNING` key
pub fn role_from_signing_key(key: &str) -> Option<String> {
    key.strip_suffix(SIGNING_SUFFIX)
        .filter(|name| !name.is_empty())
        .map(str::to_lowercase)
}
