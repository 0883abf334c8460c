//! API credential records.
//!
//! One row per issued credential. The public key carries a unique index
//! so issuance collisions surface as constraint violations; the secret
//! is stored only as a SHA-256 digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Column list shared by every query that returns full rows.
const API_KEY_COLUMNS: &str = r"id, user_id, name, public_key, secret_hash, permissions,
       rate_limit_per_minute, rate_limit_per_hour, rate_limit_per_day,
       ip_whitelist, webhook_url, webhook_secret, is_active,
       expires_at, last_used_at, usage_count, created_at, updated_at";

/// A persisted API credential.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub public_key: String,
    pub secret_hash: String,
    pub permissions: Vec<String>,
    pub rate_limit_per_minute: i32,
    pub rate_limit_per_hour: i32,
    pub rate_limit_per_day: i32,
    pub ip_whitelist: Option<Vec<String>>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for inserting a new credential record.
#[derive(Debug, Clone)]
pub struct CreateApiKey {
    pub user_id: Uuid,
    pub name: String,
    pub public_key: String,
    pub secret_hash: String,
    pub permissions: Vec<String>,
    pub rate_limit_per_minute: i32,
    pub rate_limit_per_hour: i32,
    pub rate_limit_per_day: i32,
    pub ip_whitelist: Option<Vec<String>>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Allow-listed mutable fields. Absent fields are left unchanged.
///
/// The nullable columns use a double `Option`: the outer layer marks
/// the field as present in the delta, the inner layer is the new
/// value, so `Some(None)` clears a stored whitelist, webhook target,
/// or expiry.
#[derive(Debug, Clone, Default)]
pub struct UpdateApiKey {
    pub name: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub rate_limit_per_minute: Option<i32>,
    pub rate_limit_per_hour: Option<i32>,
    pub rate_limit_per_day: Option<i32>,
    pub ip_whitelist: Option<Option<Vec<String>>>,
    pub webhook_url: Option<Option<String>>,
    pub webhook_secret: Option<Option<String>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl UpdateApiKey {
    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Names of the fields this delta would change.
    ///
    /// Used for audit metadata, which records field names but never values.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.permissions.is_some() {
            fields.push("permissions");
        }
        if self.rate_limit_per_minute.is_some() {
            fields.push("rate_limit_per_minute");
        }
        if self.rate_limit_per_hour.is_some() {
            fields.push("rate_limit_per_hour");
        }
        if self.rate_limit_per_day.is_some() {
            fields.push("rate_limit_per_day");
        }
        if self.ip_whitelist.is_some() {
            fields.push("ip_whitelist");
        }
        if self.webhook_url.is_some() {
            fields.push("webhook_url");
        }
        if self.webhook_secret.is_some() {
            fields.push("webhook_secret");
        }
        if self.expires_at.is_some() {
            fields.push("expires_at");
        }
        fields
    }
}

impl ApiKey {
    /// Insert a new credential record.
    pub async fn create(pool: &PgPool, data: CreateApiKey) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            r"
            INSERT INTO api_keys (
                user_id, name, public_key, secret_hash, permissions,
                rate_limit_per_minute, rate_limit_per_hour, rate_limit_per_day,
                ip_whitelist, webhook_url, webhook_secret, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {API_KEY_COLUMNS}
            ",
        ))
        .bind(data.user_id)
        .bind(data.name)
        .bind(data.public_key)
        .bind(data.secret_hash)
        .bind(data.permissions)
        .bind(data.rate_limit_per_minute)
        .bind(data.rate_limit_per_hour)
        .bind(data.rate_limit_per_day)
        .bind(data.ip_whitelist)
        .bind(data.webhook_url)
        .bind(data.webhook_secret)
        .bind(data.expires_at)
        .fetch_one(pool)
        .await
    }

    /// Look up a credential by its public key.
    ///
    /// Inactive records are returned so the authentication layer can
    /// log the revocation internally; its public response still
    /// collapses revoked and unknown keys to the same message.
    pub async fn find_by_public_key(
        pool: &PgPool,
        public_key: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            r"
            SELECT {API_KEY_COLUMNS}
            FROM api_keys
            WHERE public_key = $1
            ",
        ))
        .bind(public_key)
        .fetch_optional(pool)
        .await
    }

    /// Look up a credential by id, scoped to its owning account.
    pub async fn find_for_account(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            r"
            SELECT {API_KEY_COLUMNS}
            FROM api_keys
            WHERE id = $1 AND user_id = $2
            ",
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// All credentials for an account, newest first.
    pub async fn list_for_account(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            r"
            SELECT {API_KEY_COLUMNS}
            FROM api_keys
            WHERE user_id = $1
            ORDER BY created_at DESC
            ",
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Apply an allow-listed field delta, scoped to the owning account.
    ///
    /// Returns `None` when the (id, owner) pair does not resolve.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        data: UpdateApiKey,
    ) -> Result<Option<Self>, sqlx::Error> {
        // Nullable columns take a presence flag plus the new value, so
        // a present-but-null field writes NULL instead of keeping the
        // old value.
        sqlx::query_as::<_, Self>(&format!(
            r"
            UPDATE api_keys SET
                name = COALESCE($3, name),
                permissions = COALESCE($4, permissions),
                rate_limit_per_minute = COALESCE($5, rate_limit_per_minute),
                rate_limit_per_hour = COALESCE($6, rate_limit_per_hour),
                rate_limit_per_day = COALESCE($7, rate_limit_per_day),
                ip_whitelist = CASE WHEN $8 THEN $9 ELSE ip_whitelist END,
                webhook_url = CASE WHEN $10 THEN $11 ELSE webhook_url END,
                webhook_secret = CASE WHEN $12 THEN $13 ELSE webhook_secret END,
                expires_at = CASE WHEN $14 THEN $15 ELSE expires_at END,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {API_KEY_COLUMNS}
            ",
        ))
        .bind(id)
        .bind(user_id)
        .bind(data.name)
        .bind(data.permissions)
        .bind(data.rate_limit_per_minute)
        .bind(data.rate_limit_per_hour)
        .bind(data.rate_limit_per_day)
        .bind(data.ip_whitelist.is_some())
        .bind(data.ip_whitelist.flatten())
        .bind(data.webhook_url.is_some())
        .bind(data.webhook_url.flatten())
        .bind(data.webhook_secret.is_some())
        .bind(data.webhook_secret.flatten())
        .bind(data.expires_at.is_some())
        .bind(data.expires_at.flatten())
        .fetch_optional(pool)
        .await
    }

    /// Soft-deactivate a credential, scoped to the owning account.
    ///
    /// Returns the credential name when a row was updated.
    pub async fn deactivate(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as(
            r"
            UPDATE api_keys
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING name
            ",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(name,)| name))
    }

    /// Hard-delete a credential and its usage records, scoped to the
    /// owning account. Irreversible.
    pub async fn delete(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<String>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM api_usage WHERE api_key_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let row: Option<(String,)> = sqlx::query_as(
            r"
            DELETE FROM api_keys
            WHERE id = $1 AND user_id = $2
            RETURNING name
            ",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.map(|(name,)| name))
    }

    /// Bump the last-used timestamp and the monotonic usage counter.
    pub async fn touch_usage(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE api_keys
            SET last_used_at = NOW(), usage_count = usage_count + 1
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// True when the credential is active and unexpired as of `now`.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|exp| exp > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_key() -> ApiKey {
        let now = Utc::now();
        ApiKey {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "ci-pipeline".to_string(),
            public_key: "pk_abc123".to_string(),
            secret_hash: "0".repeat(64),
            permissions: vec!["files:read".to_string()],
            rate_limit_per_minute: 60,
            rate_limit_per_hour: 1000,
            rate_limit_per_day: 10000,
            ip_whitelist: None,
            webhook_url: None,
            webhook_secret: None,
            is_active: true,
            expires_at: None,
            last_used_at: None,
            usage_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn usable_when_active_and_unexpired() {
        let key = sample_key();
        assert!(key.is_usable(Utc::now()));
    }

    #[test]
    fn not_usable_when_inactive() {
        let key = ApiKey {
            is_active: false,
            ..sample_key()
        };
        assert!(!key.is_usable(Utc::now()));
    }

    #[test]
    fn not_usable_after_expiry() {
        let now = Utc::now();
        let key = ApiKey {
            expires_at: Some(now - Duration::hours(1)),
            ..sample_key()
        };
        assert!(!key.is_usable(now));
    }

    #[test]
    fn usable_before_expiry() {
        let now = Utc::now();
        let key = ApiKey {
            expires_at: Some(now + Duration::hours(1)),
            ..sample_key()
        };
        assert!(key.is_usable(now));
    }

    #[test]
    fn empty_delta_has_no_changed_fields() {
        let delta = UpdateApiKey::default();
        assert!(delta.is_empty());
        assert!(delta.changed_fields().is_empty());
    }

    #[test]
    fn changed_fields_names_only_set_fields() {
        let delta = UpdateApiKey {
            name: Some("renamed".to_string()),
            rate_limit_per_minute: Some(10),
            ..Default::default()
        };
        assert!(!delta.is_empty());
        assert_eq!(delta.changed_fields(), vec!["name", "rate_limit_per_minute"]);
    }

    #[test]
    fn clearing_a_nullable_field_counts_as_a_change() {
        let delta = UpdateApiKey {
            ip_whitelist: Some(None),
            expires_at: Some(None),
            ..Default::default()
        };
        assert!(!delta.is_empty());
        assert_eq!(delta.changed_fields(), vec!["ip_whitelist", "expires_at"]);
        assert_eq!(delta.ip_whitelist.flatten(), None);
        assert_eq!(delta.expires_at.flatten(), None);
    }
}
