//! Per-identifier fixed window rate limiting.
//!
//! Counters live in process memory. Instances behind a load balancer each
//! count on their own, so the effective limit is per instance.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

/// Above this many tracked identifiers, stale windows are dropped before counting.
const PRUNE_THRESHOLD: usize = 10_000;

/// Attempts seen for one identifier in its current window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Attempts counted in the current window
    pub attempt_count: u32,
    /// When the current window started
    pub window_start: DateTime<Utc>,
}

/// Result of [RateLimiter::check].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the attempt may proceed
    pub allowed: bool,
    /// Present when not allowed, tells the user how long to wait
    pub message: Option<String>,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            message: None,
        }
    }

    fn deny(retry_in_ms: i64) -> Self {
        let minutes = (retry_in_ms.max(0).saturating_add(59_999) / 60_000).max(1);
        let unit = if minutes == 1 { "minute" } else { "minutes" };

        Self {
            allowed: false,
            message: Some(format!(
                "Too many attempts. Please try again in {minutes} {unit}."
            )),
        }
    }
}

/// Counts attempts per identifier within a fixed window.
#[derive(Debug)]
pub struct RateLimiter {
    max_attempts: u32,
    window_ms: i64,
    records: DashMap<String, RateLimitRecord>,
}

impl RateLimiter {
    /// Allow `max_attempts` per identifier in every `window`.
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            records: DashMap::new(),
        }
    }

    /// Count an attempt for `identifier` now.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Utc::now())
    }

    /// Count an attempt for `identifier` at the given instant.
    pub fn check_at(&self, identifier: &str, now: DateTime<Utc>) -> RateLimitDecision {
        if self.records.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }

        let mut record = self
            .records
            .entry(identifier.to_string())
            .or_insert_with(|| RateLimitRecord {
                attempt_count: 0,
                window_start: now,
            });

        if self.window_elapsed(&record, now) {
            record.attempt_count = 0;
            record.window_start = now;
        }

        record.attempt_count = record.attempt_count.saturating_add(1);

        if record.attempt_count > self.max_attempts {
            let elapsed = (now - record.window_start).num_milliseconds();
            tracing::info!(
                identifier,
                attempts = record.attempt_count,
                max = self.max_attempts,
                "Rate limit exceeded"
            );
            RateLimitDecision::deny(self.window_ms.saturating_sub(elapsed))
        } else {
            RateLimitDecision::allow()
        }
    }

    /// Drop every record whose window has passed.
    pub fn prune(&self, now: DateTime<Utc>) {
        self.records
            .retain(|_, record| !self.window_elapsed(record, now));
    }

    /// The current record for an identifier, if any.
    pub fn record(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.records.get(identifier).map(|record| record.clone())
    }

    /// Number of identifiers currently tracked
    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    fn window_elapsed(&self, record: &RateLimitRecord, now: DateTime<Utc>) -> bool {
        (now - record.window_start).num_milliseconds() > self.window_ms
    }
}
