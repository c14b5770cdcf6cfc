//! Field-path validation for request payloads
//!
//! Deserialization only proves a payload has the right shape. The rules
//! here cover the constraints serde cannot express (ranges, non-empty
//! collections, the vendor-extension naming rule) and report every failure
//! with the path of the offending field, e.g. `["body", "artifacts", "0", "path"]`.

use serde::Serialize;
use thiserror::Error;

/// A single failed constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Path of the field, starting at `body`
    pub loc: Vec<String>,
    /// Human-readable description
    pub msg: String,
    /// Machine-readable error class
    #[serde(rename = "type")]
    pub kind: String,
}

/// All constraint failures found in one payload
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{} validation error(s): {}", .0.len(), summarize(.0))]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.loc.join("."), e.msg))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    /// Build a single error at `loc` (relative to `body`)
    pub fn single(loc: &[&str], kind: &str, msg: impl Into<String>) -> Self {
        let mut path = vec!["body".to_string()];
        path.extend(loc.iter().map(|s| s.to_string()));
        Self(vec![FieldError {
            loc: path,
            msg: msg.into(),
            kind: kind.to_string(),
        }])
    }

    /// Build a single error on a query parameter
    pub fn query(name: &str, kind: &str, msg: impl Into<String>) -> Self {
        Self(vec![FieldError {
            loc: vec!["query".to_string(), name.to_string()],
            msg: msg.into(),
            kind: kind.to_string(),
        }])
    }

    /// The request body could not be decoded at all
    pub fn malformed_body(msg: impl Into<String>) -> Self {
        Self::single(&[], "json_invalid", msg)
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.0
    }
}

/// Accumulates errors while walking a payload
#[derive(Debug)]
pub struct Validator {
    path: Vec<String>,
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            path: vec!["body".to_string()],
            errors: Vec::new(),
        }
    }

    /// Run `f` with `name` appended to the current path
    pub fn field<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Self),
    {
        self.path.push(name.into());
        f(self);
        self.path.pop();
    }

    /// Record an error at the current path
    pub fn error(&mut self, kind: &str, msg: impl Into<String>) {
        self.errors.push(FieldError {
            loc: self.path.clone(),
            msg: msg.into(),
            kind: kind.to_string(),
        });
    }

    /// Record an error at the current path unless `ok` holds
    pub fn check(&mut self, ok: bool, kind: &str, msg: impl Into<String>) {
        if !ok {
            self.error(kind, msg);
        }
    }

    pub fn non_empty(&mut self, value: &str) {
        self.check(
            !value.trim().is_empty(),
            "string_too_short",
            "String should have at least 1 character",
        );
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Constraints a payload must satisfy beyond its serde shape
pub trait Validate {
    fn validate(&self, v: &mut Validator);

    /// Validate from the root of the request body
    fn validated(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        self.validate(&mut v);
        v.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        left: String,
        right: Vec<u32>,
    }

    impl Validate for Pair {
        fn validate(&self, v: &mut Validator) {
            v.field("left", |v| v.non_empty(&self.left));
            v.field("right", |v| {
                for (i, n) in self.right.iter().enumerate() {
                    v.field(i.to_string(), |v| v.check(*n > 0, "greater_than", "must be > 0"));
                }
            });
        }
    }

    #[test]
    fn test_errors_carry_field_path() {
        let pair = Pair {
            left: " ".into(),
            right: vec![1, 0],
        };

        let err = pair.validated().unwrap_err();
        let locs: Vec<_> = err.errors().iter().map(|e| e.loc.join(".")).collect();
        assert_eq!(locs, vec!["body.left", "body.right.1"]);
    }

    #[test]
    fn test_valid_payload_passes() {
        let pair = Pair {
            left: "ok".into(),
            right: vec![3],
        };
        assert!(pair.validated().is_ok());
    }

    #[test]
    fn test_single_error_serializes_as_list() {
        let err = ValidationErrors::single(&["settings", "expiration"], "value_error", "bad");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "loc": ["body", "settings", "expiration"],
                "msg": "bad",
                "type": "value_error"
            }])
        );
    }
}
