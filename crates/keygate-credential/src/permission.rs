//! Fixed permission vocabulary for issued credentials.
//!
//! A credential's permission set must be a subset of this vocabulary at
//! all times; issuance and update reject anything outside it.

use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// A permission grantable to a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "files:read")]
    FilesRead,
    #[serde(rename = "files:write")]
    FilesWrite,
    #[serde(rename = "files:upload")]
    FilesUpload,
    #[serde(rename = "files:delete")]
    FilesDelete,
    #[serde(rename = "exif:extract")]
    ExifExtract,
    #[serde(rename = "exif:read")]
    ExifRead,
    #[serde(rename = "thumbnails:generate")]
    ThumbnailsGenerate,
    #[serde(rename = "thumbnails:read")]
    ThumbnailsRead,
    #[serde(rename = "batch:process")]
    BatchProcess,
    #[serde(rename = "webhooks:manage")]
    WebhooksManage,
    #[serde(rename = "analytics:read")]
    AnalyticsRead,
    #[serde(rename = "admin:read")]
    AdminRead,
}

/// Every grantable permission.
pub const ALL_PERMISSIONS: &[Permission] = &[
    Permission::FilesRead,
    Permission::FilesWrite,
    Permission::FilesUpload,
    Permission::FilesDelete,
    Permission::ExifExtract,
    Permission::ExifRead,
    Permission::ThumbnailsGenerate,
    Permission::ThumbnailsRead,
    Permission::BatchProcess,
    Permission::WebhooksManage,
    Permission::AnalyticsRead,
    Permission::AdminRead,
];

/// Permissions granted when issuance does not request a set.
pub const DEFAULT_PERMISSIONS: &[Permission] = &[
    Permission::FilesRead,
    Permission::FilesUpload,
    Permission::ExifExtract,
];

impl Permission {
    /// The wire/storage form of this permission.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::FilesRead => "files:read",
            Permission::FilesWrite => "files:write",
            Permission::FilesUpload => "files:upload",
            Permission::FilesDelete => "files:delete",
            Permission::ExifExtract => "exif:extract",
            Permission::ExifRead => "exif:read",
            Permission::ThumbnailsGenerate => "thumbnails:generate",
            Permission::ThumbnailsRead => "thumbnails:read",
            Permission::BatchProcess => "batch:process",
            Permission::WebhooksManage => "webhooks:manage",
            Permission::AnalyticsRead => "analytics:read",
            Permission::AdminRead => "admin:read",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Permission {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_PERMISSIONS
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CredentialError::InvalidPermission(s.to_string()))
    }
}

/// Parse a requested permission set, rejecting anything outside the
/// vocabulary.
pub fn parse_permissions(raw: &[String]) -> Result<Vec<Permission>, CredentialError> {
    raw.iter().map(|s| s.parse()).collect()
}

/// Storage form of a permission set.
#[must_use]
pub fn to_strings(permissions: &[Permission]) -> Vec<String> {
    permissions.iter().map(|p| p.as_str().to_string()).collect()
}

/// True when `required` is granted, directly or via the `admin:read`
/// override.
#[must_use]
pub fn has_permission(granted: &[Permission], required: Permission) -> bool {
    granted.contains(&required) || granted.contains(&Permission::AdminRead)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_permission_round_trips_through_its_string_form() {
        for permission in ALL_PERMISSIONS {
            let parsed: Permission = permission.as_str().parse().unwrap();
            assert_eq!(parsed, *permission);
        }
    }

    #[test]
    fn unknown_permission_is_rejected_by_name() {
        let err = "files:rm".parse::<Permission>().unwrap_err();
        match err {
            CredentialError::InvalidPermission(name) => assert_eq!(name, "files:rm"),
            other => panic!("expected InvalidPermission, got {other:?}"),
        }
    }

    #[test]
    fn parse_permissions_rejects_any_invalid_entry() {
        let raw = vec!["files:read".to_string(), "bogus".to_string()];
        assert!(parse_permissions(&raw).is_err());

        let raw = vec!["files:read".to_string(), "exif:extract".to_string()];
        let parsed = parse_permissions(&raw).unwrap();
        assert_eq!(parsed, vec![Permission::FilesRead, Permission::ExifExtract]);
    }

    #[test]
    fn default_grant_is_a_subset_of_the_vocabulary() {
        for permission in DEFAULT_PERMISSIONS {
            assert!(ALL_PERMISSIONS.contains(permission));
        }
    }

    #[test]
    fn direct_grant_is_honored() {
        let granted = vec![Permission::FilesRead, Permission::FilesUpload];
        assert!(has_permission(&granted, Permission::FilesRead));
        assert!(!has_permission(&granted, Permission::FilesDelete));
    }

    #[test]
    fn admin_read_overrides_everything() {
        let granted = vec![Permission::AdminRead];
        assert!(has_permission(&granted, Permission::FilesDelete));
        assert!(has_permission(&granted, Permission::WebhooksManage));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Permission::ThumbnailsGenerate).unwrap();
        assert_eq!(json, "\"thumbnails:generate\"");
        let back: Permission = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Permission::ThumbnailsGenerate);
    }
}
