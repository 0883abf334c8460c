//! Error types for the credential subsystem.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::rate_limit::RatePeriod;

/// Errors produced by credential operations.
///
/// Unknown public key and wrong secret are merged into
/// [`CredentialError::InvalidCredential`] so callers cannot learn which
/// half of a credential was wrong.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Unknown public key or secret mismatch.
    #[error("Invalid API credentials")]
    InvalidCredential,

    /// The credential carries an expiry timestamp that has passed.
    #[error("API credential has expired")]
    CredentialExpired,

    /// The credential has been deactivated.
    #[error("API credential is inactive")]
    CredentialInactive,

    /// A requested permission is outside the fixed vocabulary.
    #[error("Invalid permission: {0}")]
    InvalidPermission(String),

    /// A whitelist entry is neither an IP address nor a CIDR range.
    #[error("Invalid whitelist entry: {0}")]
    InvalidWhitelistEntry(String),

    /// An update carried no allow-listed fields.
    #[error("No valid fields to update")]
    NoValidFields,

    /// The (id, owner) pair did not resolve to a credential.
    #[error("API credential not found or access denied")]
    NotFoundOrForbidden,

    /// A rate window is exhausted.
    #[error("Rate limit exceeded: {limit} requests per {period}")]
    RateLimitExceeded {
        period: RatePeriod,
        limit: u32,
        reset_time: DateTime<Utc>,
    },

    /// The caller address matched no whitelist entry.
    #[error("IP address is not whitelisted")]
    IpNotWhitelisted,

    /// The credential store is unreachable or errored. Authentication
    /// and lifecycle operations fail closed on this; rate and whitelist
    /// checks fail open before it can surface.
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl CredentialError {
    /// Message safe to return to an unauthenticated caller.
    ///
    /// Authentication failures collapse to one generic string so the
    /// response body cannot aid credential guessing; other errors keep
    /// their display form.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            CredentialError::InvalidCredential
            | CredentialError::CredentialExpired
            | CredentialError::CredentialInactive
            | CredentialError::Store(_) => "Authentication failed".to_string(),
            other => other.to_string(),
        }
    }
}

/// Type alias for results using [`CredentialError`].
pub type Result<T> = std::result::Result<T, CredentialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_share_a_generic_public_message() {
        assert_eq!(
            CredentialError::InvalidCredential.public_message(),
            "Authentication failed"
        );
        assert_eq!(
            CredentialError::CredentialExpired.public_message(),
            "Authentication failed"
        );
        assert_eq!(
            CredentialError::Store(sqlx::Error::PoolClosed).public_message(),
            "Authentication failed"
        );
    }

    #[test]
    fn lifecycle_errors_keep_their_message() {
        assert_eq!(
            CredentialError::NoValidFields.public_message(),
            "No valid fields to update"
        );
        assert!(CredentialError::InvalidPermission("files:rm".to_string())
            .public_message()
            .contains("files:rm"));
    }

    #[test]
    fn rate_limit_error_names_the_window() {
        let err = CredentialError::RateLimitExceeded {
            period: RatePeriod::Minute,
            limit: 60,
            reset_time: Utc::now(),
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: 60 requests per minute"
        );
    }
}
