//! Multi-window rate limiting.
//!
//! Each credential is throttled by three parallel fixed windows
//! (minute, hour, day). A window's counter key incorporates the current
//! window index, so counters reset naturally when the index advances;
//! there is no explicit reset path, only expiry.
//!
//! The counter store must provide atomic increment-with-expiry: the
//! post-increment count is read from the same operation that wrote it,
//! so concurrent callers cannot race a separate check against a stale
//! read. On store failure the limiter fails open; availability wins
//! over strict throttling because the protected resource carries its
//! own coarser limits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use keygate_core::ApiKeyId;

/// Default per-minute ceiling applied at issuance.
pub const DEFAULT_PER_MINUTE: u32 = 60;

/// Default per-hour ceiling applied at issuance.
pub const DEFAULT_PER_HOUR: u32 = 1_000;

/// Default per-day ceiling applied at issuance.
pub const DEFAULT_PER_DAY: u32 = 10_000;

/// Granularity of one rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatePeriod {
    Minute,
    Hour,
    Day,
}

impl RatePeriod {
    /// Window duration in seconds.
    #[must_use]
    pub fn window_secs(self) -> u64 {
        match self {
            RatePeriod::Minute => 60,
            RatePeriod::Hour => 3_600,
            RatePeriod::Day => 86_400,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RatePeriod::Minute => "minute",
            RatePeriod::Hour => "hour",
            RatePeriod::Day => "day",
        }
    }

    /// Index of the window bucket containing `now`.
    ///
    /// Minute-of-hour, hour-of-day, day-of-month: advancing the index
    /// moves traffic onto a fresh counter key.
    #[must_use]
    pub fn bucket_index(self, now: DateTime<Utc>) -> u32 {
        match self {
            RatePeriod::Minute => now.minute(),
            RatePeriod::Hour => now.hour(),
            RatePeriod::Day => now.day(),
        }
    }

    /// Instant at which the window containing `now` ends.
    #[must_use]
    pub fn window_reset(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            RatePeriod::Minute => Utc
                .with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), now.minute(), 0)
                .single(),
            RatePeriod::Hour => Utc
                .with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0)
                .single(),
            RatePeriod::Day => Utc
                .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
                .single(),
        };
        // UTC has no DST gaps; the window start always exists.
        let start = start.unwrap_or(now);
        start + chrono::Duration::seconds(self.window_secs() as i64)
    }
}

impl std::fmt::Display for RatePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-credential throttling ceilings. All three are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: DEFAULT_PER_MINUTE,
            per_hour: DEFAULT_PER_HOUR,
            per_day: DEFAULT_PER_DAY,
        }
    }
}

impl RateLimits {
    fn ceiling(&self, period: RatePeriod) -> u32 {
        match period {
            RatePeriod::Minute => self.per_minute,
            RatePeriod::Hour => self.per_hour,
            RatePeriod::Day => self.per_day,
        }
    }
}

impl From<&keygate_db::ApiKey> for RateLimits {
    fn from(record: &keygate_db::ApiKey) -> Self {
        Self {
            per_minute: record.rate_limit_per_minute.max(0) as u32,
            per_hour: record.rate_limit_per_hour.max(0) as u32,
            per_day: record.rate_limit_per_day.max(0) as u32,
        }
    }
}

/// Counter store failure. Triggers fail-open in the limiter.
#[derive(Debug, Error)]
#[error("counter store unavailable: {0}")]
pub struct CounterStoreError(pub String);

/// Shared store of expiring counters.
///
/// `incr` must be atomic: create-at-one when the key is absent or
/// expired, increment otherwise, and return the post-increment count,
/// all as one operation.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError>;
}

#[derive(Debug)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

/// In-process counter store.
///
/// Counters live under one mutex, so increment-and-read is atomic per
/// process. State is ephemeral; loss on restart only relaxes throttling
/// for the remainder of the affected windows.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, CounterEntry>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired counters. Call periodically to bound memory.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, e| e.expires_at > now);
    }

    /// Number of live counters. Test/diagnostic helper.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at <= now {
                    e.count = 0;
                    e.expires_at = now + ttl;
                }
            })
            .or_insert(CounterEntry {
                count: 0,
                expires_at: now + ttl,
            });
        entry.count += 1;
        Ok(entry.count)
    }
}

/// Best-known remaining quota per window. May be stale after a store
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemainingQuota {
    pub minute: u32,
    pub hour: u32,
    pub day: u32,
}

/// Outcome of one rate check.
#[derive(Debug, Clone, Copy)]
pub enum RateLimitDecision {
    Allowed { remaining: RemainingQuota },
    Limited {
        period: RatePeriod,
        limit: u32,
        reset_time: DateTime<Utc>,
    },
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Three-window fixed-window rate limiter over a [`CounterStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Check and consume one call against all three windows.
    pub async fn check(&self, key_id: ApiKeyId, limits: &RateLimits) -> RateLimitDecision {
        self.check_at(Utc::now(), key_id, limits).await
    }

    /// Clock-injected variant of [`check`](Self::check); `check` passes
    /// the current time, tests pass fixed instants.
    pub async fn check_at(
        &self,
        now: DateTime<Utc>,
        key_id: ApiKeyId,
        limits: &RateLimits,
    ) -> RateLimitDecision {
        const PERIODS: [RatePeriod; 3] = [RatePeriod::Minute, RatePeriod::Hour, RatePeriod::Day];

        let mut counts = [0u64; 3];
        for (i, period) in PERIODS.iter().enumerate() {
            let limit = limits.ceiling(*period);
            let key = format!(
                "rate_limit:{key_id}:{}:{}",
                period.as_str(),
                period.bucket_index(now)
            );
            match self
                .store
                .incr(&key, Duration::from_secs(period.window_secs()))
                .await
            {
                Ok(count) => {
                    counts[i] = count;
                    if count > u64::from(limit) {
                        tracing::warn!(
                            key_id = %key_id,
                            period = period.as_str(),
                            limit,
                            count,
                            "Rate limit exceeded"
                        );
                        return RateLimitDecision::Limited {
                            period: *period,
                            limit,
                            reset_time: period.window_reset(now),
                        };
                    }
                }
                Err(e) => {
                    // Fail open: availability over strict throttling.
                    tracing::warn!(
                        key_id = %key_id,
                        period = period.as_str(),
                        error = %e,
                        "Counter store error, allowing call"
                    );
                    return RateLimitDecision::Allowed {
                        remaining: Self::remaining(limits, counts),
                    };
                }
            }
        }

        RateLimitDecision::Allowed {
            remaining: Self::remaining(limits, counts),
        }
    }

    fn remaining(limits: &RateLimits, counts: [u64; 3]) -> RemainingQuota {
        let left = |limit: u32, count: u64| -> u32 {
            u64::from(limit).saturating_sub(count).min(u64::from(u32::MAX)) as u32
        };
        RemainingQuota {
            minute: left(limits.per_minute, counts[0]),
            hour: left(limits.per_hour, counts[1]),
            day: left(limits.per_day, counts[2]),
        }
    }
}
