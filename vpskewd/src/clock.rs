//! Minute-boundary scheduling.
//!
//! Every sleep target is recomputed from wall-clock now, so a slow cycle
//! delays at most one boundary and never accumulates drift.

use chrono::{DateTime, Duration, Utc};

/// First whole minute strictly after `now`
pub fn next_minute_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let next = (now.timestamp().div_euclid(60) + 1) * 60;
    DateTime::from_timestamp(next, 0).unwrap_or(now + Duration::minutes(1))
}

/// How long to sleep from `now` until the next boundary plus `settle`
pub fn sleep_until_next(now: DateTime<Utc>, settle: Duration) -> std::time::Duration {
    (next_minute_boundary(now) + settle - now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}
