//! Append-only audit trail.
//!
//! Rows are written best-effort by the service layer and never updated.
//! Metadata is structured JSON; secret material must never appear in it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// One audit event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub event_type: String,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Data for appending an audit event.
#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    /// Acting account, when known. System-observed events (rate limit
    /// hits, whitelist violations) may have no actor.
    pub actor_id: Option<Uuid>,
    pub event_type: String,
    pub metadata: JsonValue,
}

impl AuditLog {
    /// Append one audit event.
    pub async fn append(pool: &PgPool, data: CreateAuditLog) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO audit_logs (actor_id, event_type, metadata)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(data.actor_id)
        .bind(data.event_type)
        .bind(data.metadata)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_audit_log_allows_missing_actor() {
        let data = CreateAuditLog {
            actor_id: None,
            event_type: "api_rate_limit_exceeded".to_string(),
            metadata: json!({ "period": "minute", "limit": 60 }),
        };
        assert!(data.actor_id.is_none());
        assert_eq!(data.metadata["period"], "minute");
    }
}
