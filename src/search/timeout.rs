//! Overall search deadline

use crate::config::SearchConfig;
use std::time::Duration;

/// Deadline budget for one search call.
///
/// An explicit `timeout:` wins, `count:` alone raises the budget to the
/// maximum, otherwise the default applies. Never above the maximum.
pub fn search_timeout(explicit: Option<Duration>, has_count: bool, config: &SearchConfig) -> Duration {
    let max = config.max_timeout();
    let timeout = match explicit {
        Some(timeout) => timeout,
        None if has_count => max,
        None => config.default_timeout(),
    };
    timeout.min(max)
}

/// Suggested timeout for a retry: `n` times what was used, in whole
/// seconds, at least two seconds
pub fn longer(n: u32, used: Duration) -> Duration {
    let secs = (used.as_secs_f64() * n as f64).ceil() as u64;
    Duration::from_secs(secs.max(2))
}
