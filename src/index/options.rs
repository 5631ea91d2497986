//! Index search tuning

use super::client::IndexSearchOptions;
use crate::config::IndexConfig;
use std::time::Duration;

/// Scaling factor for per-request match caps.
///
/// The fewer repositories are in scope, the richer the result set we ask
/// for. A file match limit above the default scales the factor further.
pub fn result_count_factor(
    num_repos: usize,
    file_match_limit: usize,
    global: bool,
    default_max_results: usize,
) -> usize {
    let mut k: usize = if global {
        1
    } else {
        match num_repos {
            0..=5 => 100,
            6..=10 => 10,
            11..=25 => 8,
            26..=50 => 5,
            51..=100 => 3,
            101..=500 => 2,
            _ => 1,
        }
    };
    if default_max_results > 0 && file_match_limit > default_max_results {
        k = k.saturating_mul(3).saturating_mul(file_match_limit) / default_max_results;
    }
    k
}

/// Build index search options for factor `k`.
///
/// `remaining` is the time left before the request deadline, if there is one.
pub fn search_options(
    k: usize,
    file_match_limit: usize,
    remaining: Option<Duration>,
    config: &IndexConfig,
) -> IndexSearchOptions {
    let max_wall_time = match remaining {
        Some(remaining) => remaining,
        None => {
            let default = config.default_max_wall_time();
            if config.default_max_results > 0 && file_match_limit > config.default_max_results {
                let scale = file_match_limit.saturating_mul(3) / config.default_max_results;
                let scale = u32::try_from(scale).unwrap_or(u32::MAX).max(1);
                default.checked_mul(scale).unwrap_or(Duration::MAX)
            } else {
                default
            }
        }
    };

    IndexSearchOptions {
        shard_max_match_count: k.saturating_mul(100),
        total_max_match_count: k.saturating_mul(100),
        shard_max_important_match: k.saturating_mul(15),
        total_max_important_match: k.saturating_mul(25),
        max_doc_display_count: file_match_limit.saturating_mul(2).max(2000),
        max_wall_time,
    }
}

/// Line matches kept per file
pub fn max_line_matches(k: usize) -> usize {
    k.saturating_add(25)
}

/// Fragments kept per line
pub fn max_line_fragment_matches(k: usize) -> usize {
    k.saturating_add(3)
}
