//! Credential lifecycle and request-path orchestration.
//!
//! One [`CredentialService`] is constructed at startup and shared;
//! every operation flows through it. Lifecycle mutations are scoped to
//! the owning account and audited. Request-path bookkeeping (last-used
//! touch, usage rows, audit writes) happens off the hot path: spawned
//! tasks with a write timeout, never awaited by the caller.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use sqlx::PgPool;

use keygate_core::{AccountId, ApiKeyId};
use keygate_db::{ApiKey, ApiUsage, CreateApiKey, CreateApiUsage, UpdateApiKey};

use crate::audit::{AuditEvent, AuditSink};
use crate::auth::{self, AuthenticatedKey};
use crate::error::{CredentialError, Result};
use crate::ip_whitelist;
use crate::keygen::{self, KeyPair};
use crate::permission::{self, DEFAULT_PERMISSIONS};
use crate::rate_limit::{
    CounterStore, RateLimitDecision, RateLimiter, RateLimits, RemainingQuota,
};
use crate::usage::{GlobalAnalytics, MaskedTopKey, UsageAnalytics, UsageSample};

/// Ceiling on background bookkeeping writes.
const BACKGROUND_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Issuance request. Absent fields take the documented defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueRequest {
    pub name: String,
    pub permissions: Option<Vec<String>>,
    pub rate_limit_per_minute: Option<u32>,
    pub rate_limit_per_hour: Option<u32>,
    pub rate_limit_per_day: Option<u32>,
    pub ip_whitelist: Option<Vec<String>>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Distinguishes a field that was absent from one set to `null`: absent
/// stays `None`, an explicit `null` becomes `Some(None)`.
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Update request mirroring the allow-listed mutable fields.
///
/// For the nullable fields, an explicit `null` clears the stored value
/// while an absent field leaves it unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    pub name: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub rate_limit_per_minute: Option<u32>,
    pub rate_limit_per_hour: Option<u32>,
    pub rate_limit_per_day: Option<u32>,
    #[serde(default, deserialize_with = "double_option")]
    pub ip_whitelist: Option<Option<Vec<String>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub webhook_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub webhook_secret: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// A freshly issued credential. The only moment the secret exists in
/// plaintext outside the caller's hands.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub id: ApiKeyId,
    pub name: String,
    pub public_key: String,
    /// Shown exactly once; only its digest is stored.
    pub secret: String,
    pub permissions: Vec<String>,
    pub rate_limits: RateLimits,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A credential as exposed by listings: public key masked, no secret
/// material.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyView {
    pub id: ApiKeyId,
    pub name: String,
    pub public_key_masked: String,
    pub permissions: Vec<String>,
    pub rate_limits: RateLimits,
    pub ip_whitelist: Vec<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&ApiKey> for ApiKeyView {
    fn from(record: &ApiKey) -> Self {
        Self {
            id: ApiKeyId::from_uuid(record.id),
            name: record.name.clone(),
            public_key_masked: keygen::mask_public_key(&record.public_key),
            permissions: record.permissions.clone(),
            rate_limits: RateLimits::from(record),
            ip_whitelist: record.ip_whitelist.clone().unwrap_or_default(),
            is_active: record.is_active,
            expires_at: record.expires_at,
            last_used_at: record.last_used_at,
            usage_count: record.usage_count,
            created_at: record.created_at,
        }
    }
}

/// Shared credential subsystem entry point.
#[derive(Clone)]
pub struct CredentialService {
    pool: PgPool,
    limiter: RateLimiter,
    audit: Arc<dyn AuditSink>,
}

impl CredentialService {
    #[must_use]
    pub fn new(pool: PgPool, counters: Arc<dyn CounterStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            pool,
            limiter: RateLimiter::new(counters),
            audit,
        }
    }

    /// Issue a new credential for `user_id`.
    ///
    /// Requested permissions and whitelist entries are validated before
    /// anything is generated; defaults fill the gaps.
    pub async fn issue(
        &self,
        user_id: AccountId,
        request: IssueRequest,
    ) -> Result<IssuedCredential> {
        let permissions = match &request.permissions {
            Some(raw) => permission::to_strings(&permission::parse_permissions(raw)?),
            None => permission::to_strings(DEFAULT_PERMISSIONS),
        };
        if let Some(whitelist) = &request.ip_whitelist {
            ip_whitelist::validate_whitelist(whitelist)?;
        }

        let defaults = RateLimits::default();
        let KeyPair { public_key, secret } = keygen::generate_key_pair();

        let record = ApiKey::create(
            &self.pool,
            CreateApiKey {
                user_id: *user_id.as_uuid(),
                name: request.name,
                public_key,
                secret_hash: keygen::hash_secret(&secret),
                permissions,
                rate_limit_per_minute: request
                    .rate_limit_per_minute
                    .unwrap_or(defaults.per_minute) as i32,
                rate_limit_per_hour: request.rate_limit_per_hour.unwrap_or(defaults.per_hour)
                    as i32,
                rate_limit_per_day: request.rate_limit_per_day.unwrap_or(defaults.per_day) as i32,
                ip_whitelist: request.ip_whitelist,
                webhook_url: request.webhook_url,
                webhook_secret: request.webhook_secret,
                expires_at: request.expires_at,
            },
        )
        .await?;

        tracing::info!(key_id = %record.id, user_id = %user_id, "API credential issued");
        self.audit
            .record(
                Some(*user_id.as_uuid()),
                AuditEvent::ApiKeyCreated,
                json!({
                    "key_id": record.id,
                    "name": record.name,
                    "key_prefix": keygen::mask_public_key(&record.public_key),
                }),
            )
            .await;

        Ok(IssuedCredential {
            id: ApiKeyId::from_uuid(record.id),
            name: record.name.clone(),
            public_key: record.public_key.clone(),
            secret,
            permissions: record.permissions.clone(),
            rate_limits: RateLimits::from(&record),
            expires_at: record.expires_at,
            created_at: record.created_at,
        })
    }

    /// Authenticate a presented public-key/secret pair.
    ///
    /// Runs the lookup, expiry, and secret checkpoints in order. On
    /// success the last-used touch is spawned off the request path; on
    /// failure an audit event records the masked key, never the secret.
    pub async fn authenticate(&self, public_key: &str, secret: &str) -> Result<AuthenticatedKey> {
        let record = ApiKey::find_by_public_key(&self.pool, public_key).await?;

        match auth::check_credential(record.as_ref(), secret, Utc::now()) {
            Ok(authenticated) => {
                self.spawn_touch_usage(authenticated.key_id);
                Ok(authenticated)
            }
            Err(err) => {
                tracing::warn!(
                    key_prefix = %keygen::mask_public_key(public_key),
                    reason = %err,
                    "API credential authentication failed"
                );
                // Owner is known only when the public key resolved.
                self.audit
                    .record(
                        record.as_ref().map(|r| r.user_id),
                        AuditEvent::ApiKeyAuthFailed,
                        json!({
                            "key_prefix": keygen::mask_public_key(public_key),
                            "reason": err.public_message(),
                        }),
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Consume one call against the credential's three rate windows.
    ///
    /// Returns the remaining quota when allowed. A counter-store outage
    /// never rejects the call.
    pub async fn check_rate_limit(&self, key: &AuthenticatedKey) -> Result<RemainingQuota> {
        match self.limiter.check(key.key_id, &key.rate_limits).await {
            RateLimitDecision::Allowed { remaining } => Ok(remaining),
            RateLimitDecision::Limited {
                period,
                limit,
                reset_time,
            } => {
                self.audit
                    .record(
                        Some(*key.user_id.as_uuid()),
                        AuditEvent::RateLimitExceeded,
                        json!({
                            "key_id": key.key_id,
                            "period": period.as_str(),
                            "limit": limit,
                        }),
                    )
                    .await;
                Err(CredentialError::RateLimitExceeded {
                    period,
                    limit,
                    reset_time,
                })
            }
        }
    }

    /// Check the caller address against the credential's whitelist.
    ///
    /// An unparseable address is denied and audited; fail-open is
    /// reserved for store infrastructure, not for bad input.
    pub async fn check_ip_whitelist(&self, key: &AuthenticatedKey, caller_ip: &str) -> Result<()> {
        if key.ip_whitelist.is_empty() {
            return Ok(());
        }

        let allowed = match caller_ip.parse::<IpAddr>() {
            Ok(addr) => ip_whitelist::is_ip_whitelisted(&key.ip_whitelist, addr),
            Err(_) => {
                tracing::warn!(key_id = %key.key_id, caller_ip, "Unparseable caller address");
                false
            }
        };

        if allowed {
            Ok(())
        } else {
            tracing::warn!(key_id = %key.key_id, caller_ip, "Caller address not whitelisted");
            self.audit
                .record(
                    Some(*key.user_id.as_uuid()),
                    AuditEvent::IpWhitelistViolation,
                    json!({
                        "key_id": key.key_id,
                        "ip_address": caller_ip,
                    }),
                )
                .await;
            Err(CredentialError::IpNotWhitelisted)
        }
    }

    /// Fetch one credential, masked, scoped to its owner.
    pub async fn get(&self, user_id: AccountId, key_id: ApiKeyId) -> Result<ApiKeyView> {
        let record = ApiKey::find_for_account(&self.pool, *key_id.as_uuid(), *user_id.as_uuid())
            .await?
            .ok_or(CredentialError::NotFoundOrForbidden)?;
        Ok(ApiKeyView::from(&record))
    }

    /// List an account's credentials, masked, newest first.
    pub async fn list(&self, user_id: AccountId) -> Result<Vec<ApiKeyView>> {
        let records = ApiKey::list_for_account(&self.pool, *user_id.as_uuid()).await?;
        Ok(records.iter().map(ApiKeyView::from).collect())
    }

    /// Apply an allow-listed update, scoped to the owning account.
    pub async fn update(
        &self,
        user_id: AccountId,
        key_id: ApiKeyId,
        request: UpdateRequest,
    ) -> Result<ApiKeyView> {
        let permissions = match &request.permissions {
            Some(raw) => Some(permission::to_strings(&permission::parse_permissions(
                raw,
            )?)),
            None => None,
        };
        if let Some(Some(whitelist)) = &request.ip_whitelist {
            ip_whitelist::validate_whitelist(whitelist)?;
        }

        let delta = UpdateApiKey {
            name: request.name,
            permissions,
            rate_limit_per_minute: request.rate_limit_per_minute.map(|v| v as i32),
            rate_limit_per_hour: request.rate_limit_per_hour.map(|v| v as i32),
            rate_limit_per_day: request.rate_limit_per_day.map(|v| v as i32),
            ip_whitelist: request.ip_whitelist,
            webhook_url: request.webhook_url,
            webhook_secret: request.webhook_secret,
            expires_at: request.expires_at,
        };
        if delta.is_empty() {
            return Err(CredentialError::NoValidFields);
        }
        let changed = delta.changed_fields();

        let record = ApiKey::update(&self.pool, *key_id.as_uuid(), *user_id.as_uuid(), delta)
            .await?
            .ok_or(CredentialError::NotFoundOrForbidden)?;

        tracing::info!(key_id = %key_id, user_id = %user_id, ?changed, "API credential updated");
        self.audit
            .record(
                Some(*user_id.as_uuid()),
                AuditEvent::ApiKeyUpdated,
                json!({
                    "key_id": key_id,
                    "fields": changed,
                }),
            )
            .await;

        Ok(ApiKeyView::from(&record))
    }

    /// Soft-deactivate a credential. Reversible only through support
    /// tooling; authentication rejects the key immediately.
    pub async fn deactivate(&self, user_id: AccountId, key_id: ApiKeyId) -> Result<()> {
        let name = ApiKey::deactivate(&self.pool, *key_id.as_uuid(), *user_id.as_uuid())
            .await?
            .ok_or(CredentialError::NotFoundOrForbidden)?;

        tracing::info!(key_id = %key_id, user_id = %user_id, "API credential deactivated");
        self.audit
            .record(
                Some(*user_id.as_uuid()),
                AuditEvent::ApiKeyDeactivated,
                json!({ "key_id": key_id, "name": name }),
            )
            .await;
        Ok(())
    }

    /// Hard-delete a credential and its usage history. Irreversible.
    pub async fn delete(&self, user_id: AccountId, key_id: ApiKeyId) -> Result<()> {
        let name = ApiKey::delete(&self.pool, *key_id.as_uuid(), *user_id.as_uuid())
            .await?
            .ok_or(CredentialError::NotFoundOrForbidden)?;

        tracing::info!(key_id = %key_id, user_id = %user_id, "API credential deleted");
        self.audit
            .record(
                Some(*user_id.as_uuid()),
                AuditEvent::ApiKeyDeleted,
                json!({ "key_id": key_id, "name": name }),
            )
            .await;
        Ok(())
    }

    /// Record one observed call against a credential.
    ///
    /// Fire-and-forget: the write runs in a spawned task under a
    /// timeout, and a failure is logged and dropped.
    pub fn record_usage(&self, key_id: ApiKeyId, sample: UsageSample) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let write = ApiUsage::insert(
                &pool,
                CreateApiUsage {
                    api_key_id: *key_id.as_uuid(),
                    endpoint: sample.endpoint,
                    method: sample.method,
                    status_code: sample.status_code,
                    response_time_ms: sample.response_time_ms,
                    request_size: sample.request_size,
                    response_size: sample.response_size,
                    ip_address: sample.ip_address,
                    user_agent: sample.user_agent,
                },
            );
            match tokio::time::timeout(BACKGROUND_WRITE_TIMEOUT, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(key_id = %key_id, error = %e, "Failed to record API usage");
                }
                Err(_) => {
                    tracing::warn!(key_id = %key_id, "Timed out recording API usage");
                }
            }
        });
    }

    /// Per-credential analytics over an arbitrary reporting range,
    /// scoped to the owning account.
    ///
    /// For the common canned ranges, derive `start` with
    /// [`crate::usage::AnalyticsPeriod::window_start`].
    pub async fn analytics(
        &self,
        user_id: AccountId,
        key_id: ApiKeyId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<UsageAnalytics> {
        let key = *key_id.as_uuid();
        let owner = *user_id.as_uuid();

        // Ownership check up front so an empty window is not confused
        // with a foreign key id.
        ApiKey::find_for_account(&self.pool, key, owner)
            .await?
            .ok_or(CredentialError::NotFoundOrForbidden)?;

        let by_endpoint = ApiUsage::stats_by_endpoint(&self.pool, key, owner, start, end).await?;
        let by_day = ApiUsage::stats_by_day(&self.pool, key, owner, start, end).await?;
        let by_status = ApiUsage::stats_by_status(&self.pool, key, owner, start, end).await?;

        Ok(UsageAnalytics {
            period_start: start,
            period_end: end,
            by_endpoint,
            by_day,
            by_status,
        })
    }

    /// System-wide analytics over an arbitrary reporting range. Public
    /// keys in the top-credentials list are masked.
    pub async fn global_analytics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        top_limit: i64,
    ) -> Result<GlobalAnalytics> {
        let total_requests = ApiUsage::total_requests(&self.pool, start, end).await?;
        let top_endpoints = ApiUsage::top_endpoints(&self.pool, start, end, top_limit).await?;
        let top_keys = ApiUsage::top_keys(&self.pool, start, end, top_limit)
            .await?
            .into_iter()
            .map(MaskedTopKey::from)
            .collect();

        Ok(GlobalAnalytics {
            period_start: start,
            period_end: end,
            total_requests,
            top_endpoints,
            top_keys,
        })
    }

    fn spawn_touch_usage(&self, key_id: ApiKeyId) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let touch = ApiKey::touch_usage(&pool, *key_id.as_uuid());
            match tokio::time::timeout(BACKGROUND_WRITE_TIMEOUT, touch).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(key_id = %key_id, error = %e, "Failed to touch last-used");
                }
                Err(_) => {
                    tracing::warn!(key_id = %key_id, "Timed out touching last-used");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn issued_credential_serializes_with_plaintext_secret() {
        let issued = IssuedCredential {
            id: ApiKeyId::new(),
            name: "ci".to_string(),
            public_key: "pk_abcdef123".to_string(),
            secret: "sk_plaintext".to_string(),
            permissions: vec!["files:read".to_string()],
            rate_limits: RateLimits::default(),
            expires_at: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&issued).unwrap();
        assert!(json.contains("sk_plaintext"));
        assert!(json.contains("pk_abcdef123"));
    }

    #[test]
    fn update_request_distinguishes_absent_from_explicit_null() {
        let req: UpdateRequest = serde_json::from_str(
            r#"{"name":"renamed","expires_at":null,"ip_whitelist":null}"#,
        )
        .unwrap();
        assert_eq!(req.name.as_deref(), Some("renamed"));
        // Explicit null clears; absent leaves the field untouched.
        assert_eq!(req.expires_at, Some(None));
        assert_eq!(req.ip_whitelist, Some(None));
        assert!(req.webhook_url.is_none());

        let req: UpdateRequest = serde_json::from_str(
            r#"{"expires_at":"2027-01-01T00:00:00Z","ip_whitelist":["10.0.0.0/8"]}"#,
        )
        .unwrap();
        assert!(matches!(req.expires_at, Some(Some(_))));
        assert_eq!(
            req.ip_whitelist,
            Some(Some(vec!["10.0.0.0/8".to_string()]))
        );
    }

    #[test]
    fn listing_view_masks_the_public_key() {
        let now = Utc::now();
        let record = ApiKey {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "ci".to_string(),
            public_key: "pk_abcdef1234567890".to_string(),
            secret_hash: "0".repeat(64),
            permissions: vec!["files:read".to_string()],
            rate_limit_per_minute: 60,
            rate_limit_per_hour: 1000,
            rate_limit_per_day: 10000,
            ip_whitelist: Some(vec!["10.0.0.0/8".to_string()]),
            webhook_url: None,
            webhook_secret: None,
            is_active: true,
            expires_at: None,
            last_used_at: None,
            usage_count: 7,
            created_at: now,
            updated_at: now,
        };
        let view = ApiKeyView::from(&record);
        assert_eq!(view.public_key_masked, "pk_abcde...");
        assert_eq!(view.rate_limits.per_hour, 1000);
        assert_eq!(view.ip_whitelist, vec!["10.0.0.0/8".to_string()]);

        // The view type has no field that could carry the digest.
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains(&record.secret_hash));
        assert!(!json.contains(&record.public_key));
    }
}
