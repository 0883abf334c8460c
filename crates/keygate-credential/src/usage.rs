//! Usage recording and analytics views.
//!
//! Usage rows are written off the request path: recording spawns a
//! bounded background write so a slow store never adds latency to the
//! call being recorded, and a failed write is logged and dropped.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use keygate_db::{DailyStat, EndpointStat, StatusCodeStat, TopEndpoint, TopKey};

use crate::keygen;

/// One observed API call, as reported by the serving layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSample {
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i32,
    #[serde(default)]
    pub request_size: i64,
    #[serde(default)]
    pub response_size: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Reporting window for analytics queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsPeriod {
    Day,
    Week,
    Month,
    Quarter,
}

impl AnalyticsPeriod {
    /// Start of this window, counting back from `end`.
    #[must_use]
    pub fn window_start(self, end: DateTime<Utc>) -> DateTime<Utc> {
        let days = match self {
            AnalyticsPeriod::Day => 1,
            AnalyticsPeriod::Week => 7,
            AnalyticsPeriod::Month => 30,
            AnalyticsPeriod::Quarter => 90,
        };
        end - Duration::days(days)
    }
}

/// Per-credential analytics over one reporting window.
#[derive(Debug, Clone, Serialize)]
pub struct UsageAnalytics {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub by_endpoint: Vec<EndpointStat>,
    pub by_day: Vec<DailyStat>,
    pub by_status: Vec<StatusCodeStat>,
}

/// A top-credential entry with its public key masked for display.
#[derive(Debug, Clone, Serialize)]
pub struct MaskedTopKey {
    pub name: String,
    pub public_key: String,
    pub request_count: i64,
}

impl From<TopKey> for MaskedTopKey {
    fn from(row: TopKey) -> Self {
        Self {
            name: row.name,
            public_key: keygen::mask_public_key(&row.public_key),
            request_count: row.request_count,
        }
    }
}

/// System-wide analytics over one reporting window.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalAnalytics {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_requests: i64,
    pub top_endpoints: Vec<TopEndpoint>,
    pub top_keys: Vec<MaskedTopKey>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_windows_count_back_from_the_end() {
        let end = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();
        assert_eq!(
            AnalyticsPeriod::Day.window_start(end),
            Utc.with_ymd_and_hms(2026, 8, 22, 12, 0, 0).unwrap()
        );
        assert_eq!(
            AnalyticsPeriod::Week.window_start(end),
            Utc.with_ymd_and_hms(2026, 8, 16, 12, 0, 0).unwrap()
        );
        assert_eq!(
            AnalyticsPeriod::Quarter.window_start(end),
            Utc.with_ymd_and_hms(2026, 5, 25, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn top_keys_are_masked_for_display() {
        let row = TopKey {
            name: "prod ingest".to_string(),
            public_key: "pk_AbCdEfGhIjKlMnOp".to_string(),
            request_count: 420,
        };
        let masked = MaskedTopKey::from(row);
        assert_eq!(masked.public_key, "pk_AbCdE...");
        assert_eq!(masked.request_count, 420);
    }

    #[test]
    fn usage_sample_defaults_sizes_to_zero() {
        let sample: UsageSample = serde_json::from_str(
            r#"{"endpoint":"/v1/files","method":"GET","status_code":200,
                "response_time_ms":9,"ip_address":null,"user_agent":null}"#,
        )
        .unwrap();
        assert_eq!(sample.request_size, 0);
        assert_eq!(sample.response_size, 0);
    }
}
