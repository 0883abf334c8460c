//! Audit event sink.
//!
//! Every lifecycle mutation and every rejection is recorded with the
//! acting account (when known) and non-sensitive metadata. Writes are
//! best-effort: a sink failure is logged and never propagated to the
//! operation that triggered it.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use keygate_db::{AuditLog, CreateAuditLog};

/// Audit event vocabulary for the credential subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    ApiKeyCreated,
    ApiKeyUpdated,
    ApiKeyDeactivated,
    ApiKeyDeleted,
    ApiKeyAuthFailed,
    RateLimitExceeded,
    IpWhitelistViolation,
}

impl AuditEvent {
    /// The stored form of this event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEvent::ApiKeyCreated => "api_key_created",
            AuditEvent::ApiKeyUpdated => "api_key_updated",
            AuditEvent::ApiKeyDeactivated => "api_key_deactivated",
            AuditEvent::ApiKeyDeleted => "api_key_deleted",
            AuditEvent::ApiKeyAuthFailed => "api_key_auth_failed",
            AuditEvent::RateLimitExceeded => "api_rate_limit_exceeded",
            AuditEvent::IpWhitelistViolation => "api_ip_whitelist_violation",
        }
    }
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one event. Implementations must be best-effort: failures
    /// are logged, never returned.
    async fn record(&self, actor: Option<Uuid>, event: AuditEvent, metadata: JsonValue);
}

/// Audit sink appending to the `audit_logs` table.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, actor: Option<Uuid>, event: AuditEvent, metadata: JsonValue) {
        let pool = self.pool.clone();
        let data = CreateAuditLog {
            actor_id: actor,
            event_type: event.as_str().to_string(),
            metadata,
        };
        // Off the caller's path: the triggering operation never waits
        // on, or fails because of, the audit write.
        tokio::spawn(async move {
            let write = AuditLog::append(&pool, data);
            match tokio::time::timeout(std::time::Duration::from_secs(5), write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event = %event, error = %e, "Failed to append audit event");
                }
                Err(_) => {
                    tracing::warn!(event = %event, "Timed out appending audit event");
                }
            }
        });
    }
}

/// Sink that discards every event. For embedding contexts without an
/// audit store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _actor: Option<Uuid>, _event: AuditEvent, _metadata: JsonValue) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_match_stored_vocabulary() {
        assert_eq!(AuditEvent::ApiKeyCreated.as_str(), "api_key_created");
        assert_eq!(AuditEvent::ApiKeyAuthFailed.as_str(), "api_key_auth_failed");
        assert_eq!(
            AuditEvent::RateLimitExceeded.as_str(),
            "api_rate_limit_exceeded"
        );
        assert_eq!(
            AuditEvent::IpWhitelistViolation.as_str(),
            "api_ip_whitelist_violation"
        );
    }

    #[tokio::test]
    async fn null_sink_accepts_events() {
        let sink = NullAuditSink;
        sink.record(None, AuditEvent::ApiKeyDeleted, serde_json::json!({}))
            .await;
    }
}
