//! Strongly typed identifiers.
//!
//! Newtype wrappers around [`Uuid`] that prevent mixing up the owning
//! account of a credential with the credential itself at compile time.
//!
//! # Example
//!
//! ```
//! use keygate_core::{AccountId, ApiKeyId};
//!
//! let account = AccountId::new();
//! let key = ApiKeyId::new();
//!
//! fn scoped_lookup(account: AccountId, key: ApiKeyId) -> String {
//!     format!("{account}/{key}")
//! }
//!
//! let _ = scoped_lookup(account, key);
//! // scoped_lookup(key, account); // does not compile
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The underlying UUID parse error message.
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Identifier of the account that owns one or more credentials.
    AccountId
);

define_id!(
    /// Identifier of an issued API credential.
    ApiKeyId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_distinct_ids() {
        assert_ne!(AccountId::new(), AccountId::new());
        assert_ne!(ApiKeyId::new(), ApiKeyId::new());
    }

    #[test]
    fn from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = ApiKeyId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn display_matches_uuid_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = AccountId::from_uuid(uuid);
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn serializes_as_plain_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = ApiKeyId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }

    #[test]
    fn serde_roundtrip() {
        let original = AccountId::new();
        let json = serde_json::to_string(&original).unwrap();
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn parse_valid_uuid() {
        let id: ApiKeyId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn parse_invalid_uuid_names_the_type() {
        let result: std::result::Result<AccountId, _> = "not-a-uuid".parse();
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "AccountId");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn usable_as_map_key() {
        use std::collections::HashMap;
        let mut map: HashMap<ApiKeyId, u32> = HashMap::new();
        let id = ApiKeyId::new();
        map.insert(id, 7);
        assert_eq!(map.get(&id), Some(&7));
    }
}
