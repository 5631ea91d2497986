//! Terminal result of a search

use super::common::SearchResultsCommon;
use crate::models::{sort_results, SearchAlert, SearchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub results: Vec<SearchResult>,
    pub common: SearchResultsCommon,

    #[serde(default)]
    pub alert: Option<SearchAlert>,

    #[serde(skip, default = "Instant::now")]
    pub start: Instant,

    pub started_at: DateTime<Utc>,
}

impl SearchResults {
    pub fn new(results: Vec<SearchResult>, common: SearchResultsCommon, start: Instant) -> Self {
        Self {
            results,
            common,
            alert: None,
            start,
            started_at: Utc::now()
                - chrono::Duration::from_std(start.elapsed())
                    .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }

    /// Empty results carrying only an alert
    pub fn with_alert(alert: SearchAlert, start: Instant) -> Self {
        let mut results = Self::new(Vec::new(), SearchResultsCommon::new(), start);
        results.alert = Some(alert);
        results
    }

    /// Total matches across all results
    pub fn match_count(&self) -> usize {
        self.results.iter().map(SearchResult::result_count).sum()
    }

    pub fn limit_hit(&self) -> bool {
        self.common.limit_hit()
    }

    /// Match count with a `+` when more may exist
    pub fn approximate_result_count(&self) -> String {
        let count = self.match_count();
        if self.limit_hit() || !self.common.cloning.is_empty() || !self.common.timedout.is_empty() {
            format!("{}+", count)
        } else {
            count.to_string()
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Order by repository name, then URI
    pub fn sort(&mut self) {
        sort_results(&mut self.results);
    }

    /// Keep at most `limit` results, recording truncation as a limit hit
    pub fn truncate(&mut self, limit: usize) {
        if self.results.len() > limit {
            self.results.truncate(limit);
            self.common.limit_hit = true;
        }
    }
}
