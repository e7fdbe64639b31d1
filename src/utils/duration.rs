//! Duration formatting utilities.
//!
//! Status reports show how long ago something happened, e.g. `1h 5m 3s`.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Time elapsed from `since` to `now`, truncated to whole seconds.
///
/// Timestamps in the future count as zero elapsed time.
pub fn elapsed_between(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let secs = (now - since).num_seconds();
    Duration::from_secs(u64::try_from(secs).unwrap_or(0))
}

/// Human-readable elapsed time, e.g. `2m 30s`
///
/// # Examples
/// ```
/// use chrono::{Duration, Utc};
/// use clusterbook::utils::duration::format_elapsed;
///
/// let now = Utc::now();
/// assert_eq!(format_elapsed(now - Duration::seconds(150), now), "2m 30s");
/// ```
pub fn format_elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    humantime::format_duration(elapsed_between(since, now)).to_string()
}
