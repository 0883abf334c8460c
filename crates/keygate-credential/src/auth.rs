//! Credential authentication.
//!
//! Authentication runs the checkpoints in a fixed order: key lookup,
//! active check, expiry check, secret verification. Any failure aborts
//! the chain. Unknown key and secret mismatch both surface as
//! [`CredentialError::InvalidCredential`]; revocation and expiry are
//! distinguished internally for logging but collapse to the same
//! public message.

use chrono::{DateTime, Utc};

use keygate_core::{AccountId, ApiKeyId};
use keygate_db::ApiKey;

use crate::error::{CredentialError, Result};
use crate::keygen;
use crate::permission::{self, Permission};
use crate::rate_limit::RateLimits;

/// The authenticated identity derived from a valid credential pair.
///
/// Carries everything downstream checks need so the record does not
/// have to be re-read per call.
#[derive(Debug, Clone)]
pub struct AuthenticatedKey {
    pub key_id: ApiKeyId,
    pub user_id: AccountId,
    pub name: String,
    pub permissions: Vec<Permission>,
    pub rate_limits: RateLimits,
    pub ip_whitelist: Vec<String>,
}

impl AuthenticatedKey {
    /// True when `required` is granted, directly or via `admin:read`.
    #[must_use]
    pub fn has_permission(&self, required: Permission) -> bool {
        permission::has_permission(&self.permissions, required)
    }
}

impl TryFrom<&ApiKey> for AuthenticatedKey {
    type Error = CredentialError;

    fn try_from(record: &ApiKey) -> Result<Self> {
        Ok(Self {
            key_id: ApiKeyId::from_uuid(record.id),
            user_id: AccountId::from_uuid(record.user_id),
            name: record.name.clone(),
            permissions: permission::parse_permissions(&record.permissions)?,
            rate_limits: RateLimits::from(record),
            ip_whitelist: record.ip_whitelist.clone().unwrap_or_default(),
        })
    }
}

/// Run the active, expiry, and secret checkpoints against a looked-up
/// record.
///
/// `record` is `None` when the public key matched nothing; the lookup
/// itself is the first checkpoint. Secret verification runs in
/// constant time over the stored digest.
pub fn check_credential(
    record: Option<&ApiKey>,
    presented_secret: &str,
    now: DateTime<Utc>,
) -> Result<AuthenticatedKey> {
    let record = record.ok_or(CredentialError::InvalidCredential)?;

    if !record.is_active {
        return Err(CredentialError::CredentialInactive);
    }

    if record.expires_at.is_some_and(|exp| exp <= now) {
        return Err(CredentialError::CredentialExpired);
    }

    if !keygen::verify_secret(presented_secret, &record.secret_hash) {
        return Err(CredentialError::InvalidCredential);
    }

    AuthenticatedKey::try_from(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn record_with_secret(secret: &str) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "test key".to_string(),
            public_key: "pk_test".to_string(),
            secret_hash: keygen::hash_secret(secret),
            permissions: vec!["files:read".to_string(), "exif:extract".to_string()],
            rate_limit_per_minute: 60,
            rate_limit_per_hour: 1_000,
            rate_limit_per_day: 10_000,
            ip_whitelist: None,
            webhook_url: None,
            webhook_secret: None,
            is_active: true,
            expires_at: None,
            last_used_at: None,
            usage_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn missing_record_is_invalid_credential() {
        let err = check_credential(None, "sk_whatever", Utc::now()).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidCredential));
    }

    #[test]
    fn revoked_record_is_rejected_with_generic_public_message() {
        let mut record = record_with_secret("sk_good");
        record.is_active = false;
        let err = check_credential(Some(&record), "sk_good", Utc::now()).unwrap_err();
        assert!(matches!(err, CredentialError::CredentialInactive));
        assert_eq!(err.public_message(), "Authentication failed");
    }

    #[test]
    fn expired_record_is_rejected_before_secret_check() {
        let mut record = record_with_secret("sk_good");
        record.expires_at = Some(Utc::now() - Duration::hours(1));
        let err = check_credential(Some(&record), "sk_good", Utc::now()).unwrap_err();
        assert!(matches!(err, CredentialError::CredentialExpired));
    }

    #[test]
    fn wrong_secret_is_invalid_credential() {
        let record = record_with_secret("sk_good");
        let err = check_credential(Some(&record), "sk_bad", Utc::now()).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidCredential));
    }

    #[test]
    fn valid_pair_yields_authenticated_key() {
        let record = record_with_secret("sk_good");
        let auth = check_credential(Some(&record), "sk_good", Utc::now()).unwrap();
        assert_eq!(auth.key_id, ApiKeyId::from_uuid(record.id));
        assert_eq!(auth.user_id, AccountId::from_uuid(record.user_id));
        assert!(auth.has_permission(Permission::FilesRead));
        assert!(!auth.has_permission(Permission::FilesDelete));
        assert_eq!(auth.rate_limits.per_minute, 60);
    }

    #[test]
    fn future_expiry_is_accepted() {
        let mut record = record_with_secret("sk_good");
        record.expires_at = Some(Utc::now() + Duration::days(30));
        assert!(check_credential(Some(&record), "sk_good", Utc::now()).is_ok());
    }

    #[test]
    fn enumeration_resistant_public_messages() {
        let record = record_with_secret("sk_good");
        let unknown = check_credential(None, "sk_good", Utc::now()).unwrap_err();
        let wrong = check_credential(Some(&record), "sk_bad", Utc::now()).unwrap_err();
        assert_eq!(unknown.public_message(), wrong.public_message());
    }
}
