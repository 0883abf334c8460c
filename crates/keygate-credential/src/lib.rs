//! API credential issuance, authentication, and throttling.
//!
//! This crate owns the full credential lifecycle for machine callers:
//!
//! - **Issuance**: `pk_`/`sk_` token pairs with 256 bits of entropy
//!   each; the secret is shown once and stored only as a SHA-256 digest.
//! - **Authentication**: lookup, expiry, and constant-time secret
//!   checkpoints, with unknown-key and wrong-secret failures merged so
//!   responses cannot aid enumeration.
//! - **Throttling**: three fixed windows (minute, hour, day) over a
//!   pluggable counter store, failing open on store outage.
//! - **Source restriction**: per-credential IP and CIDR whitelists.
//! - **Accounting**: fire-and-forget usage records, per-credential and
//!   global analytics, and an audit trail of every mutation and
//!   rejection.
//!
//! Construct one [`CredentialService`] at startup and share it.

pub mod audit;
pub mod auth;
pub mod error;
pub mod ip_whitelist;
pub mod keygen;
pub mod permission;
pub mod rate_limit;
pub mod service;
pub mod usage;

pub use keygate_core::{AccountId, ApiKeyId};

pub use audit::{AuditEvent, AuditSink, NullAuditSink, PgAuditSink};
pub use auth::AuthenticatedKey;
pub use error::{CredentialError, Result};
pub use keygen::{KeyPair, MASK_PREFIX_LEN, PUBLIC_KEY_PREFIX, SECRET_PREFIX};
pub use permission::{Permission, ALL_PERMISSIONS, DEFAULT_PERMISSIONS};
pub use rate_limit::{
    CounterStore, CounterStoreError, MemoryCounterStore, RateLimitDecision, RateLimiter,
    RateLimits, RatePeriod, RemainingQuota,
};
pub use service::{
    ApiKeyView, CredentialService, IssueRequest, IssuedCredential, UpdateRequest,
};
pub use usage::{AnalyticsPeriod, GlobalAnalytics, MaskedTopKey, UsageAnalytics, UsageSample};
