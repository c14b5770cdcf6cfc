//! Users, scopes and tokens

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of authorization scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScopeName {
    #[serde(rename = "read:bootstrap")]
    ReadBootstrap,
    #[serde(rename = "read:settings")]
    ReadSettings,
    #[serde(rename = "read:tasks")]
    ReadTasks,
    #[serde(rename = "read:token")]
    ReadToken,
    #[serde(rename = "write:bootstrap")]
    WriteBootstrap,
    #[serde(rename = "write:targets")]
    WriteTargets,
    #[serde(rename = "write:token")]
    WriteToken,
    #[serde(rename = "delete:targets")]
    DeleteTargets,
}

impl ScopeName {
    pub const ALL: [ScopeName; 8] = [
        ScopeName::ReadBootstrap,
        ScopeName::ReadSettings,
        ScopeName::ReadTasks,
        ScopeName::ReadToken,
        ScopeName::WriteBootstrap,
        ScopeName::WriteTargets,
        ScopeName::WriteToken,
        ScopeName::DeleteTargets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeName::ReadBootstrap => "read:bootstrap",
            ScopeName::ReadSettings => "read:settings",
            ScopeName::ReadTasks => "read:tasks",
            ScopeName::ReadToken => "read:token",
            ScopeName::WriteBootstrap => "write:bootstrap",
            ScopeName::WriteTargets => "write:targets",
            ScopeName::WriteToken => "write:token",
            ScopeName::DeleteTargets => "delete:targets",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScopeName::ReadBootstrap => "Read (GET) bootstrap",
            ScopeName::ReadSettings => "Read (GET) settings",
            ScopeName::ReadTasks => "Read (GET) tasks",
            ScopeName::ReadToken => "Read (GET) tokens",
            ScopeName::WriteBootstrap => "Write (POST) bootstrap",
            ScopeName::WriteTargets => "Write (POST) targets",
            ScopeName::WriteToken => "Write (POST) token",
            ScopeName::DeleteTargets => "Delete (DELETE) targets",
        }
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown scope: {0}")]
pub struct ParseScopeError(pub String);

impl FromStr for ScopeName {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScopeName::ALL
            .iter()
            .find(|scope| scope.as_str() == s)
            .copied()
            .ok_or_else(|| ParseScopeError(s.to_string()))
    }
}

/// A stored user
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// A stored scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// A user-scope grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserScope {
    pub user_id: i64,
    pub scope_id: i64,
}

/// Claims carried by a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// `user_<id>_<nonce>`
    pub sub: String,
    pub username: String,
    pub scopes: Vec<String>,
    /// Expiration as a UNIX timestamp
    pub exp: i64,
}

impl TokenClaims {
    /// User id encoded in the subject
    pub fn user_id(&self) -> Option<i64> {
        self.sub
            .strip_prefix("user_")?
            .split('_')
            .next()?
            .parse()
            .ok()
    }

    pub fn has_scope(&self, scope: ScopeName) -> bool {
        self.scopes.iter().any(|s| s == scope.as_str())
    }
}

/// Issued bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

impl Token {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// What `GET /token` reports about a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub username: String,
    pub scopes: Vec<String>,
    pub expired: bool,
    pub expiration: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_round_trip_through_str() {
        for scope in ScopeName::ALL {
            assert_eq!(scope.as_str().parse::<ScopeName>().unwrap(), scope);
        }
        assert!("admin:all".parse::<ScopeName>().is_err());
    }

    #[test]
    fn test_subject_user_id() {
        let claims = TokenClaims {
            sub: "user_7_9f2c".into(),
            username: "admin".into(),
            scopes: vec!["read:tasks".into()],
            exp: 0,
        };
        assert_eq!(claims.user_id(), Some(7));
        assert!(claims.has_scope(ScopeName::ReadTasks));
        assert!(!claims.has_scope(ScopeName::WriteToken));
    }

    #[test]
    fn test_user_debug_hides_hash() {
        let user = User {
            id: 1,
            username: "admin".into(),
            password_hash: "$argon2id$secret".into(),
            created_at: Utc::now(),
        };
        assert!(!format!("{user:?}").contains("argon2id"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_only_catalogue_names_parse(name in "[a-z]{1,8}:[a-z]{1,10}") {
            let parsed = name.parse::<ScopeName>();
            let known = ScopeName::ALL.iter().any(|s| s.as_str() == name);
            prop_assert_eq!(parsed.is_ok(), known);
        }

        #[test]
        fn prop_subject_carries_user_id(id in 1i64..i64::MAX, nonce in "[0-9a-f]{16}") {
            let claims = TokenClaims {
                sub: format!("user_{id}_{nonce}"),
                username: "u".into(),
                scopes: vec![],
                exp: 0,
            };
            prop_assert_eq!(claims.user_id(), Some(id));
        }
    }
}
