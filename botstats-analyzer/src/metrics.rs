//! Per-address rate and danger metrics.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Danger contributed per request-per-minute of rate.
pub const DANGER_PER_RATE: f64 = 1.0 / 10.0;

/// Danger contributed per request of volume.
pub const DANGER_PER_REQUEST: f64 = 1.0 / 100.0;

/// Flat danger added when the user agent is suspicious.
pub const SUSPICIOUS_USER_AGENT_DANGER: f64 = 25.0;

/// Derived, immutable statistics for one source address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressMetric {
    pub address: IpAddr,
    /// Requests per minute over the observation span.
    pub rate: f64,
    pub total_requests: usize,
    pub span_secs: i64,
    pub first_seen: i64,
    pub last_seen: i64,
    /// Requests in the busiest calendar minute.
    pub peak_minute_requests: u64,
    /// Requests per minute bucket, keyed by `unix_secs / 60`.
    #[serde(skip)]
    pub minute_counts: BTreeMap<i64, u64>,
    pub danger_score: f64,
    pub suspicious: bool,
    /// Always `false`; reserved for user-agent heuristics.
    pub suspicious_user_agent: bool,
}

impl AddressMetric {
    /// Compute metrics for `address` from its request timestamps (any order).
    ///
    /// `timestamps` must not be empty.
    pub fn from_timestamps(
        address: IpAddr,
        timestamps: &[DateTime<Utc>],
        rate_threshold: f64,
    ) -> Self {
        let mut secs: Vec<i64> = timestamps.iter().map(DateTime::timestamp).collect();
        secs.sort_unstable();

        let first_seen = secs.first().copied().unwrap_or_default();
        let last_seen = secs.last().copied().unwrap_or_default();

        let mut minute_counts = BTreeMap::new();
        for ts in &secs {
            *minute_counts.entry(ts.div_euclid(60)).or_insert(0u64) += 1;
        }
        let peak_minute_requests = minute_counts.values().copied().max().unwrap_or(0);

        let rate = rate_per_minute(&secs);
        let suspicious_user_agent = false;

        Self {
            address,
            rate,
            total_requests: secs.len(),
            span_secs: last_seen - first_seen,
            first_seen,
            last_seen,
            peak_minute_requests,
            minute_counts,
            danger_score: danger_score(rate, secs.len(), suspicious_user_agent),
            suspicious: rate > rate_threshold,
            suspicious_user_agent,
        }
    }
}

/// Requests per minute for sorted Unix-second timestamps.
///
/// Zero for fewer than two timestamps or a zero span.
pub fn rate_per_minute(sorted_secs: &[i64]) -> f64 {
    let (Some(first), Some(last)) = (sorted_secs.first(), sorted_secs.last()) else {
        return 0.0;
    };
    let span = last - first;
    if sorted_secs.len() < 2 || span <= 0 {
        return 0.0;
    }
    sorted_secs.len() as f64 / (span as f64 / 60.0)
}

/// Danger score: weighted rate plus weighted volume plus a user-agent bonus.
pub fn danger_score(rate: f64, total_requests: usize, suspicious_user_agent: bool) -> f64 {
    let mut score = rate * DANGER_PER_RATE + total_requests as f64 * DANGER_PER_REQUEST;
    if suspicious_user_agent {
        score += SUSPICIOUS_USER_AGENT_DANGER;
    }
    score
}
