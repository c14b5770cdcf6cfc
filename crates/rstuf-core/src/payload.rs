//! Request payload schemas
//!
//! Each mutating endpoint accepts one of these types. Serde enforces the
//! shape; [`Validate`] enforces the remaining field constraints. Checks that
//! depend on live repository settings (the online-role set) are separate
//! methods taking those settings as arguments.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::metadata::{Key, Signature, TufMetadata};
use crate::roles::{online_roles, Role};
use crate::task::TaskId;
use crate::validation::{Validate, ValidationErrors, Validator};

/// Custom-field key stamped on artifacts when requested
pub const ADDED_BY_TASK_ID: &str = "added_by_task_id";

const MIN_DELEGATED_BINS: u32 = 2;
const MAX_DELEGATED_BINS: u32 = 16384;

/// Longest a bootstrap may be supervised before it is rolled back (one day)
pub const MAX_BOOTSTRAP_TIMEOUT: u64 = 24 * 60 * 60;

fn default_true() -> bool {
    true
}

fn default_bootstrap_timeout() -> u64 {
    300
}

fn default_delegated_bins() -> u32 {
    256
}

fn default_threshold() -> u32 {
    1
}

fn check_expiration_days(v: &mut Validator, expiration: &BTreeMap<Role, u32>) {
    for (role, days) in expiration {
        v.field(role.as_str(), |v| {
            v.check(*days >= 1, "greater_than_equal", "Input should be greater than or equal to 1")
        });
    }
}

/// Metadata maps may only carry the `root` document
fn check_root_only(v: &mut Validator, metadata: &BTreeMap<String, TufMetadata>) {
    v.field("metadata", |v| {
        v.check(metadata.contains_key("root"), "missing", "Field required: root");
        for (name, md) in metadata {
            v.field(name.clone(), |v| {
                if name == "root" {
                    md.validate(v);
                } else {
                    v.error("literal_error", "Input should be 'root'");
                }
            });
        }
    });
}

// =============================================================================
// Bootstrap
// =============================================================================

/// `POST /bootstrap`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapPayload {
    pub settings: BootstrapSettings,
    pub metadata: BTreeMap<String, TufMetadata>,
    /// Seconds the coordinator waits for the worker before rolling back
    #[serde(default = "default_bootstrap_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSettings {
    pub expiration: BTreeMap<Role, u32>,
    pub services: ServiceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub targets_base_url: String,
    #[serde(default = "default_delegated_bins")]
    pub number_of_delegated_bins: u32,
    #[serde(default = "default_true")]
    pub targets_online_key: bool,
}

impl Validate for BootstrapPayload {
    fn validate(&self, v: &mut Validator) {
        v.field("settings", |v| {
            v.field("expiration", |v| check_expiration_days(v, &self.settings.expiration));
            v.field("services", |v| {
                let services = &self.settings.services;
                v.field("targets_base_url", |v| v.non_empty(&services.targets_base_url));
                v.field("number_of_delegated_bins", |v| {
                    v.check(
                        (MIN_DELEGATED_BINS..=MAX_DELEGATED_BINS)
                            .contains(&services.number_of_delegated_bins),
                        "value_error",
                        format!(
                            "Input should be between {MIN_DELEGATED_BINS} and {MAX_DELEGATED_BINS}"
                        ),
                    )
                });
            });
        });
        check_root_only(v, &self.metadata);
        v.field("timeout", |v| {
            v.check(self.timeout >= 1, "greater_than_equal", "Input should be greater than or equal to 1");
            v.check(
                self.timeout <= MAX_BOOTSTRAP_TIMEOUT,
                "less_than_equal",
                format!("Input should be less than or equal to {MAX_BOOTSTRAP_TIMEOUT}"),
            );
        });
    }
}

// =============================================================================
// Artifacts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub info: ArtifactInfo,
    pub path: String,
}

/// `POST /artifacts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddArtifactsPayload {
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub add_task_id_to_custom: bool,
    #[serde(default = "default_true")]
    pub publish_artifacts: bool,
}

impl AddArtifactsPayload {
    /// Record `task_id` in every artifact's custom field
    ///
    /// A caller-supplied `added_by_task_id` wins over the generated one.
    pub fn stamp_task_id(&mut self, task_id: &TaskId) {
        for artifact in &mut self.artifacts {
            artifact
                .info
                .custom
                .get_or_insert_with(Map::new)
                .entry(ADDED_BY_TASK_ID)
                .or_insert_with(|| Value::String(task_id.to_string()));
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }
}

impl Validate for AddArtifactsPayload {
    fn validate(&self, v: &mut Validator) {
        v.field("artifacts", |v| {
            v.check(
                !self.artifacts.is_empty(),
                "too_short",
                "List should have at least 1 item",
            );
            for (i, artifact) in self.artifacts.iter().enumerate() {
                v.field(i.to_string(), |v| {
                    v.field("path", |v| v.non_empty(&artifact.path));
                    v.field("info", |v| {
                        v.field("hashes", |v| {
                            v.check(
                                !artifact.info.hashes.is_empty(),
                                "too_short",
                                "At least one hash is required",
                            )
                        })
                    });
                });
            }
        });
    }
}

/// `POST /artifacts/delete`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteArtifactsPayload {
    pub artifacts: Vec<String>,
    #[serde(default = "default_true")]
    pub publish_artifacts: bool,
}

impl Validate for DeleteArtifactsPayload {
    fn validate(&self, v: &mut Validator) {
        v.field("artifacts", |v| {
            v.check(
                !self.artifacts.is_empty(),
                "too_short",
                "List should have at least 1 item",
            );
            for (i, path) in self.artifacts.iter().enumerate() {
                v.field(i.to_string(), |v| v.non_empty(path));
            }
        });
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// `POST /metadata`: offline root rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataUpdatePayload {
    pub metadata: BTreeMap<String, TufMetadata>,
}

impl Validate for MetadataUpdatePayload {
    fn validate(&self, v: &mut Validator) {
        check_root_only(v, &self.metadata);
    }
}

/// `POST /metadata/online`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataOnlinePayload {
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl MetadataOnlinePayload {
    /// An empty role list means every current online role
    pub fn expand(mut self, targets_online_key: bool) -> Self {
        if self.roles.is_empty() {
            self.roles = online_roles(targets_online_key).into_iter().collect();
        }
        self
    }
}

impl Validate for MetadataOnlinePayload {
    fn validate(&self, v: &mut Validator) {
        v.field("roles", |v| {
            for (i, role) in self.roles.iter().enumerate() {
                v.field(i.to_string(), |v| {
                    v.check(
                        *role != Role::Root,
                        "value_error",
                        "root is an offline role",
                    )
                });
            }
        });
    }
}

/// `POST /metadata/sign`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSignPayload {
    pub role: String,
    pub signature: Signature,
}

impl Validate for MetadataSignPayload {
    fn validate(&self, v: &mut Validator) {
        v.field("role", |v| v.non_empty(&self.role));
        v.field("signature", |v| {
            v.field("keyid", |v| v.non_empty(&self.signature.keyid));
            v.field("sig", |v| v.non_empty(&self.signature.sig));
        });
    }
}

/// `POST /metadata/sign/delete`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSignDeletePayload {
    pub role: String,
}

impl Validate for MetadataSignDeletePayload {
    fn validate(&self, v: &mut Validator) {
        v.field("role", |v| v.non_empty(&self.role));
    }
}

// =============================================================================
// Delegations
// =============================================================================

/// What a delegation request does to the delegated roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationChange {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: String,
    #[serde(default)]
    pub terminating: bool,
    #[serde(default)]
    pub keyids: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(default)]
    pub paths: Vec<String>,
    /// Days before the worker bumps the role's expiration
    #[serde(
        rename = "x-rstuf-expire-policy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_policy: Option<u32>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegations {
    #[serde(default)]
    pub keys: BTreeMap<String, Key>,
    pub roles: Vec<DelegatedRole>,
}

/// `POST /delegations` and `PUT /delegations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationsPayload {
    pub delegations: Delegations,
}

fn check_delegated_name(v: &mut Validator, name: &str) {
    v.field("name", |v| {
        v.non_empty(name);
        v.check(
            name.parse::<Role>().is_err(),
            "value_error",
            format!("'{name}' is a reserved role name"),
        );
    });
}

impl Validate for DelegationsPayload {
    fn validate(&self, v: &mut Validator) {
        v.field("delegations", |v| {
            v.field("keys", |v| {
                for (keyid, key) in &self.delegations.keys {
                    v.field(keyid.clone(), |v| key.validate(v));
                }
            });
            v.field("roles", |v| {
                v.check(
                    !self.delegations.roles.is_empty(),
                    "too_short",
                    "List should have at least 1 item",
                );
                for (i, role) in self.delegations.roles.iter().enumerate() {
                    v.field(i.to_string(), |v| {
                        check_delegated_name(v, &role.name);
                        v.field("threshold", |v| {
                            v.check(
                                role.threshold >= 1,
                                "greater_than_equal",
                                "Input should be greater than or equal to 1",
                            );
                            v.check(
                                role.keyids.is_empty() || role.threshold as usize <= role.keyids.len(),
                                "value_error",
                                "threshold cannot exceed the number of keyids",
                            );
                        });
                        v.field("paths", |v| {
                            v.check(
                                !role.paths.is_empty(),
                                "too_short",
                                "List should have at least 1 item",
                            )
                        });
                        for name in role.extensions.keys() {
                            if !crate::metadata::is_vendor_extension(name) {
                                v.field(name.clone(), |v| {
                                    v.error("extra_forbidden", "Extra inputs are not permitted")
                                });
                            }
                        }
                    });
                }
            });
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedRoleName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationNames {
    pub roles: Vec<DelegatedRoleName>,
}

/// `POST /delegations/delete`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDelegationsPayload {
    pub delegations: DelegationNames,
}

impl Validate for DeleteDelegationsPayload {
    fn validate(&self, v: &mut Validator) {
        v.field("delegations", |v| {
            v.field("roles", |v| {
                v.check(
                    !self.delegations.roles.is_empty(),
                    "too_short",
                    "List should have at least 1 item",
                );
                for (i, role) in self.delegations.roles.iter().enumerate() {
                    v.field(i.to_string(), |v| check_delegated_name(v, &role.name));
                }
            });
        });
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSettings {
    pub expiration: BTreeMap<Role, u32>,
}

/// `PUT /config`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPutPayload {
    pub settings: ConfigSettings,
}

impl ConfigPutPayload {
    /// Only roles that are online right now may have their expiration changed
    pub fn check_online_roles(&self, online: &BTreeSet<Role>) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        v.field("settings", |v| {
            v.field("expiration", |v| {
                for role in self.settings.expiration.keys() {
                    if !online.contains(role) {
                        v.field(role.as_str(), |v| {
                            v.error(
                                "value_error",
                                format!(
                                    "'{role}' is not an online role; allowed: {}",
                                    online.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
                                ),
                            )
                        });
                    }
                }
            });
        });
        v.finish()
    }
}

impl Validate for ConfigPutPayload {
    fn validate(&self, v: &mut Validator) {
        v.field("settings", |v| {
            v.field("expiration", |v| {
                v.check(
                    !self.settings.expiration.is_empty(),
                    "too_short",
                    "At least one role expiration is required",
                );
                check_expiration_days(v, &self.settings.expiration);
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::root_metadata;
    use serde_json::json;

    fn bootstrap_json() -> Value {
        json!({
            "settings": {
                "expiration": {"root": 365, "targets": 365, "snapshot": 1, "timestamp": 1, "bins": 1},
                "services": {"targets_base_url": "http://www.example.com/repository/"}
            },
            "metadata": {"root": root_metadata()}
        })
    }

    #[test]
    fn test_bootstrap_defaults() {
        let payload: BootstrapPayload = serde_json::from_value(bootstrap_json()).unwrap();
        assert_eq!(payload.timeout, 300);
        assert_eq!(payload.settings.services.number_of_delegated_bins, 256);
        assert!(payload.settings.services.targets_online_key);
        assert!(payload.validated().is_ok());
    }

    #[test]
    fn test_bootstrap_rejects_non_root_metadata() {
        let mut raw = bootstrap_json();
        raw["metadata"]["targets"] = root_metadata();
        let payload: BootstrapPayload = serde_json::from_value(raw).unwrap();

        let err = payload.validated().unwrap_err();
        assert_eq!(err.errors()[0].loc, vec!["body", "metadata", "targets"]);
    }

    #[test]
    fn test_bootstrap_timeout_is_bounded() {
        let mut raw = bootstrap_json();
        raw["timeout"] = json!(MAX_BOOTSTRAP_TIMEOUT);
        let payload: BootstrapPayload = serde_json::from_value(raw.clone()).unwrap();
        assert!(payload.validated().is_ok());

        raw["timeout"] = json!(u64::MAX);
        let payload: BootstrapPayload = serde_json::from_value(raw).unwrap();
        let err = payload.validated().unwrap_err();
        assert_eq!(err.errors()[0].loc, vec!["body", "timeout"]);
        assert_eq!(err.errors()[0].kind, "less_than_equal");
    }

    #[test]
    fn test_bootstrap_rejects_out_of_range_bins() {
        let mut raw = bootstrap_json();
        raw["settings"]["services"]["number_of_delegated_bins"] = json!(1);
        let payload: BootstrapPayload = serde_json::from_value(raw).unwrap();
        assert!(payload.validated().is_err());
    }

    #[test]
    fn test_bootstrap_unknown_role_fails_to_parse() {
        let mut raw = bootstrap_json();
        raw["settings"]["expiration"]["mirror"] = json!(1);
        assert!(serde_json::from_value::<BootstrapPayload>(raw).is_err());
    }

    #[test]
    fn test_stamp_task_id_preserves_custom() {
        let mut payload: AddArtifactsPayload = serde_json::from_value(json!({
            "artifacts": [
                {"info": {"length": 1, "hashes": {"sha256": "ab"}, "custom": {"tag": "x"}}, "path": "a.tar"},
                {"info": {"length": 2, "hashes": {"sha256": "cd"}}, "path": "b.tar"},
                {"info": {"length": 3, "hashes": {"sha256": "ef"}, "custom": {"added_by_task_id": "mine"}}, "path": "c.tar"}
            ],
            "add_task_id_to_custom": true
        }))
        .unwrap();
        let task_id = TaskId::from("f00d".to_string());

        payload.stamp_task_id(&task_id);

        let custom = |i: usize| Value::Object(payload.artifacts[i].info.custom.clone().unwrap());
        assert_eq!(custom(0), json!({"added_by_task_id": "f00d", "tag": "x"}));
        assert_eq!(custom(1), json!({"added_by_task_id": "f00d"}));
        assert_eq!(custom(2), json!({"added_by_task_id": "mine"}));
    }

    #[test]
    fn test_add_artifacts_defaults_and_rules() {
        let payload: AddArtifactsPayload = serde_json::from_value(json!({
            "artifacts": [{"info": {"length": 1, "hashes": {}}, "path": ""}]
        }))
        .unwrap();
        assert!(!payload.add_task_id_to_custom);
        assert!(payload.publish_artifacts);

        let err = payload.validated().unwrap_err();
        assert_eq!(err.errors().len(), 2);
    }

    #[test]
    fn test_online_expand() {
        let payload = MetadataOnlinePayload { roles: vec![] };
        let expanded = payload.clone().expand(true);
        assert_eq!(
            expanded.roles,
            vec![Role::Targets, Role::Snapshot, Role::Timestamp, Role::Bins]
        );
        let expanded = payload.expand(false);
        assert!(!expanded.roles.contains(&Role::Targets));

        let explicit = MetadataOnlinePayload { roles: vec![Role::Snapshot] }.expand(true);
        assert_eq!(explicit.roles, vec![Role::Snapshot]);
    }

    #[test]
    fn test_online_rejects_root() {
        let payload = MetadataOnlinePayload { roles: vec![Role::Root] };
        assert!(payload.validated().is_err());
    }

    #[test]
    fn test_config_online_role_check() {
        let payload: ConfigPutPayload = serde_json::from_value(json!({
            "settings": {"expiration": {"targets": 30, "timestamp": 1}}
        }))
        .unwrap();
        assert!(payload.validated().is_ok());
        assert!(payload.check_online_roles(&online_roles(true)).is_ok());

        let err = payload.check_online_roles(&online_roles(false)).unwrap_err();
        assert_eq!(
            err.errors()[0].loc,
            vec!["body", "settings", "expiration", "targets"]
        );
    }

    #[test]
    fn test_config_root_never_allowed() {
        let payload: ConfigPutPayload = serde_json::from_value(json!({
            "settings": {"expiration": {"root": 365}}
        }))
        .unwrap();
        assert!(payload.check_online_roles(&online_roles(true)).is_err());
    }

    #[test]
    fn test_delegations_rules() {
        let payload: DelegationsPayload = serde_json::from_value(json!({
            "delegations": {
                "keys": {},
                "roles": [
                    {"name": "project-a", "keyids": ["k1"], "threshold": 1, "paths": ["project-a/*"], "x-rstuf-expire-policy": 14},
                    {"name": "targets", "keyids": ["k1"], "threshold": 2, "paths": []}
                ]
            }
        }))
        .unwrap();

        let err = payload.validated().unwrap_err();
        let locs: Vec<_> = err.errors().iter().map(|e| e.loc.join(".")).collect();
        assert_eq!(
            locs,
            vec![
                "body.delegations.roles.1.name",
                "body.delegations.roles.1.threshold",
                "body.delegations.roles.1.paths",
            ]
        );
        assert_eq!(payload.delegations.roles[0].expire_policy, Some(14));
    }

    #[test]
    fn test_delete_delegations_only_names() {
        let payload: DeleteDelegationsPayload = serde_json::from_value(json!({
            "delegations": {"roles": [{"name": "project-a"}]}
        }))
        .unwrap();
        assert!(payload.validated().is_ok());
    }
}
