//! TUF metadata subset accepted in request payloads
//!
//! The API never verifies signatures; the worker does. What the API does
//! guarantee is that every field it forwards is either part of the TUF
//! schema or a vendor extension named `x-<vendor>-<name>`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::validation::{Validate, Validator};

static VENDOR_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^x(-[^-]+){2,}$").expect("static regex"));

const METADATA_TYPES: [&str; 4] = ["root", "targets", "snapshot", "timestamp"];

/// Whether an unrecognized field name is an admissible vendor extension
///
/// `x-rstuf-sig-hint` qualifies; `foo`, `x-foo` and `x--foo` do not.
pub fn is_vendor_extension(name: &str) -> bool {
    VENDOR_EXTENSION.is_match(name)
}

fn check_extensions(v: &mut Validator, extensions: &BTreeMap<String, Value>) {
    for name in extensions.keys() {
        if !is_vendor_extension(name) {
            v.field(name.clone(), |v| {
                v.error(
                    "extra_forbidden",
                    "Extra inputs are not permitted; use the 'x-<vendor>-<name>' format",
                )
            });
        }
    }
}

/// Signed TUF metadata: `{signatures, signed}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TufMetadata {
    pub signatures: Vec<Signature>,
    pub signed: Signed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    pub sig: String,
}

/// The `signed` portion of a metadata document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signed {
    #[serde(rename = "_type")]
    pub kind: String,
    pub version: u64,
    pub spec_version: String,
    pub expires: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistent_snapshot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<BTreeMap<String, Key>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<BTreeMap<String, RoleKeyIds>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Any other field; each must be a vendor extension
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

/// A public key entry in `signed.keys`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyValue,
    #[serde(rename = "x-rstuf-key-name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "x-rstuf-online-key-uri",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub online_key_uri: Option<String>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub public: String,
}

/// Key ids and threshold of a role in `signed.roles`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeyIds {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

impl Validate for TufMetadata {
    fn validate(&self, v: &mut Validator) {
        v.field("signatures", |v| {
            for (i, signature) in self.signatures.iter().enumerate() {
                v.field(i.to_string(), |v| v.field("keyid", |v| v.non_empty(&signature.keyid)));
            }
        });
        v.field("signed", |v| self.signed.validate(v));
    }
}

impl Validate for Signed {
    fn validate(&self, v: &mut Validator) {
        v.field("_type", |v| {
            v.check(
                METADATA_TYPES.contains(&self.kind.as_str()),
                "literal_error",
                "Input should be 'root', 'targets', 'snapshot' or 'timestamp'",
            )
        });
        v.field("version", |v| {
            v.check(self.version >= 1, "greater_than_equal", "Input should be greater than or equal to 1")
        });
        v.field("spec_version", |v| v.non_empty(&self.spec_version));
        v.field("expires", |v| {
            v.check(
                chrono::DateTime::parse_from_rfc3339(&self.expires).is_ok(),
                "datetime_parsing",
                "Input should be a valid RFC 3339 datetime",
            )
        });
        if let Some(keys) = &self.keys {
            v.field("keys", |v| {
                for (keyid, key) in keys {
                    v.field(keyid.clone(), |v| key.validate(v));
                }
            });
        }
        if let Some(roles) = &self.roles {
            v.field("roles", |v| {
                for (name, role) in roles {
                    v.field(name.clone(), |v| {
                        v.field("threshold", |v| {
                            v.check(
                                role.threshold >= 1,
                                "greater_than_equal",
                                "Input should be greater than or equal to 1",
                            )
                        })
                    });
                }
            });
        }
        check_extensions(v, &self.extensions);
    }
}

impl Validate for Key {
    fn validate(&self, v: &mut Validator) {
        v.field("keytype", |v| v.non_empty(&self.keytype));
        v.field("scheme", |v| v.non_empty(&self.scheme));
        v.field("keyval", |v| v.field("public", |v| v.non_empty(&self.keyval.public)));
        check_extensions(v, &self.extensions);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn root_metadata() -> Value {
        json!({
            "signatures": [{"keyid": "c6d8bf2e", "sig": "917046f9076eef41"}],
            "signed": {
                "_type": "root",
                "version": 1,
                "spec_version": "1.0.31",
                "expires": "2030-08-15T14:30:45.0000001Z",
                "consistent_snapshot": true,
                "keys": {
                    "c6d8bf2e": {
                        "keytype": "ed25519",
                        "scheme": "ed25519",
                        "keyval": {"public": "4f66dabebcf30628963786001984c0b7"},
                        "x-rstuf-key-name": "online"
                    }
                },
                "roles": {
                    "root": {"keyids": ["c6d8bf2e"], "threshold": 1},
                    "timestamp": {"keyids": ["c6d8bf2e"], "threshold": 1}
                }
            }
        })
    }

    fn parse(value: Value) -> TufMetadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_vendor_extension_pattern() {
        assert!(is_vendor_extension("x-rstuf-sig-hint"));
        assert!(is_vendor_extension("x-rstuf-key-name"));
        assert!(is_vendor_extension("x-acme-thing"));
        assert!(!is_vendor_extension("foo"));
        assert!(!is_vendor_extension("x-foo"));
        assert!(!is_vendor_extension("x--foo"));
        assert!(!is_vendor_extension("y-rstuf-foo"));
    }

    #[test]
    fn test_valid_root_metadata() {
        let md = parse(root_metadata());
        assert!(md.validated().is_ok());
        assert_eq!(md.signed.keys.unwrap()["c6d8bf2e"].name.as_deref(), Some("online"));
    }

    #[test]
    fn test_extra_field_without_vendor_prefix_rejected() {
        let mut raw = root_metadata();
        raw["signed"]["foo"] = json!("bar");

        let err = parse(raw).validated().unwrap_err();
        assert_eq!(err.errors().len(), 1);
        assert_eq!(err.errors()[0].loc, vec!["body", "signed", "foo"]);
        assert_eq!(err.errors()[0].kind, "extra_forbidden");
    }

    #[test]
    fn test_vendor_extension_accepted_and_forwarded() {
        let mut raw = root_metadata();
        raw["signed"]["x-rstuf-sig-hint"] = json!({"keyid": "c6d8bf2e"});

        let md = parse(raw);
        assert!(md.validated().is_ok());

        let forwarded = serde_json::to_value(&md).unwrap();
        assert_eq!(forwarded["signed"]["x-rstuf-sig-hint"]["keyid"], "c6d8bf2e");
    }

    #[test]
    fn test_key_extension_rule() {
        let mut raw = root_metadata();
        raw["signed"]["keys"]["c6d8bf2e"]["label"] = json!("nope");

        let err = parse(raw).validated().unwrap_err();
        assert_eq!(
            err.errors()[0].loc,
            vec!["body", "signed", "keys", "c6d8bf2e", "label"]
        );
    }

    #[test]
    fn test_bad_type_and_expires() {
        let mut raw = root_metadata();
        raw["signed"]["_type"] = json!("mirror");
        raw["signed"]["expires"] = json!("tomorrow");

        let err = parse(raw).validated().unwrap_err();
        assert_eq!(err.errors().len(), 2);
    }

    #[test]
    fn test_forwarding_omits_absent_optionals() {
        let md = parse(root_metadata());
        let forwarded = serde_json::to_value(&md).unwrap();
        assert!(forwarded["signed"].get("targets").is_none());
        assert!(forwarded["signed"].get("meta").is_none());
    }
}
