//! Per-call usage records and analytics aggregates.
//!
//! Usage rows are append-only: one per authenticated call, never
//! updated. Aggregation queries join through `api_keys` so analytics
//! stay scoped to the owning account.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// One recorded API call.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiUsage {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i32,
    pub request_size: i64,
    pub response_size: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data for appending a usage record.
#[derive(Debug, Clone)]
pub struct CreateApiUsage {
    pub api_key_id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i32,
    pub request_size: i64,
    pub response_size: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Aggregate usage for one endpoint + method pair.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EndpointStat {
    pub endpoint: String,
    pub method: String,
    pub request_count: i64,
    pub avg_response_time_ms: Option<f64>,
    pub success_count: i64,
    pub error_count: i64,
}

/// Aggregate usage for one day.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub request_count: i64,
    pub avg_response_time_ms: Option<f64>,
}

/// Request count for one status code.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StatusCodeStat {
    pub status_code: i32,
    pub count: i64,
}

/// Global top-endpoint entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TopEndpoint {
    pub endpoint: String,
    pub request_count: i64,
    pub avg_response_time_ms: Option<f64>,
}

/// Global top-credential entry. The public key is returned unmasked
/// here; callers mask it before exposure.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TopKey {
    pub name: String,
    pub public_key: String,
    pub request_count: i64,
}

impl ApiUsage {
    /// Append one usage record.
    pub async fn insert(pool: &PgPool, data: CreateApiUsage) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO api_usage (
                api_key_id, endpoint, method, status_code, response_time_ms,
                request_size, response_size, ip_address, user_agent
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(data.api_key_id)
        .bind(data.endpoint)
        .bind(data.method)
        .bind(data.status_code)
        .bind(data.response_time_ms)
        .bind(data.request_size)
        .bind(data.response_size)
        .bind(data.ip_address)
        .bind(data.user_agent)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Per-endpoint aggregates for one credential, scoped to its owner.
    pub async fn stats_by_endpoint(
        pool: &PgPool,
        api_key_id: Uuid,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EndpointStat>, sqlx::Error> {
        sqlx::query_as::<_, EndpointStat>(
            r"
            SELECT
                au.endpoint,
                au.method,
                COUNT(*) AS request_count,
                AVG(au.response_time_ms)::float8 AS avg_response_time_ms,
                COUNT(*) FILTER (WHERE au.status_code BETWEEN 200 AND 299) AS success_count,
                COUNT(*) FILTER (WHERE au.status_code >= 400) AS error_count
            FROM api_usage au
            JOIN api_keys ak ON au.api_key_id = ak.id
            WHERE ak.id = $1 AND ak.user_id = $2
              AND au.created_at BETWEEN $3 AND $4
            GROUP BY au.endpoint, au.method
            ORDER BY request_count DESC
            ",
        )
        .bind(api_key_id)
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
    }

    /// Per-day aggregates for one credential, scoped to its owner.
    pub async fn stats_by_day(
        pool: &PgPool,
        api_key_id: Uuid,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailyStat>, sqlx::Error> {
        sqlx::query_as::<_, DailyStat>(
            r"
            SELECT
                au.created_at::date AS date,
                COUNT(*) AS request_count,
                AVG(au.response_time_ms)::float8 AS avg_response_time_ms
            FROM api_usage au
            JOIN api_keys ak ON au.api_key_id = ak.id
            WHERE ak.id = $1 AND ak.user_id = $2
              AND au.created_at BETWEEN $3 AND $4
            GROUP BY au.created_at::date
            ORDER BY date
            ",
        )
        .bind(api_key_id)
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
    }

    /// Per-status-code counts for one credential, scoped to its owner.
    pub async fn stats_by_status(
        pool: &PgPool,
        api_key_id: Uuid,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StatusCodeStat>, sqlx::Error> {
        sqlx::query_as::<_, StatusCodeStat>(
            r"
            SELECT au.status_code, COUNT(*) AS count
            FROM api_usage au
            JOIN api_keys ak ON au.api_key_id = ak.id
            WHERE ak.id = $1 AND ak.user_id = $2
              AND au.created_at BETWEEN $3 AND $4
            GROUP BY au.status_code
            ORDER BY count DESC
            ",
        )
        .bind(api_key_id)
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
    }

    /// Total request count across all credentials.
    pub async fn total_requests(
        pool: &PgPool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM api_usage WHERE created_at BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;
        Ok(total)
    }

    /// The busiest endpoints across all credentials.
    pub async fn top_endpoints(
        pool: &PgPool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TopEndpoint>, sqlx::Error> {
        sqlx::query_as::<_, TopEndpoint>(
            r"
            SELECT
                endpoint,
                COUNT(*) AS request_count,
                AVG(response_time_ms)::float8 AS avg_response_time_ms
            FROM api_usage
            WHERE created_at BETWEEN $1 AND $2
            GROUP BY endpoint
            ORDER BY request_count DESC
            LIMIT $3
            ",
        )
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// The busiest credentials across all accounts.
    pub async fn top_keys(
        pool: &PgPool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TopKey>, sqlx::Error> {
        sqlx::query_as::<_, TopKey>(
            r"
            SELECT ak.name, ak.public_key, COUNT(au.*) AS request_count
            FROM api_usage au
            JOIN api_keys ak ON au.api_key_id = ak.id
            WHERE au.created_at BETWEEN $1 AND $2
            GROUP BY ak.id, ak.name, ak.public_key
            ORDER BY request_count DESC
            LIMIT $3
            ",
        )
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
