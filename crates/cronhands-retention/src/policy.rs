//! Age checks.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Age of an entry last modified at `mtime`. Zero for future mtimes.
pub fn age(now: DateTime<Utc>, mtime: DateTime<Utc>) -> Duration {
    (now - mtime).to_std().unwrap_or(Duration::ZERO)
}

/// Whether an entry is old enough to delete: strictly older than `max_age`.
pub fn is_expired(now: DateTime<Utc>, mtime: DateTime<Utc>, max_age: Duration) -> bool {
    age(now, mtime) > max_age
}
