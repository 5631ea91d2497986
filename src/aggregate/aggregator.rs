//! Single merge point for concurrently produced results

use super::common::SearchResultsCommon;
use crate::error::AppError;
use crate::models::{ResultType, SearchAlert, SearchResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct AggregatorState {
    results: Vec<SearchResult>,

    /// File URI to position in `results`
    file_index: HashMap<String, usize>,
    common: SearchResultsCommon,
    errors: Vec<AppError>,
    alert: Option<SearchAlert>,
}

/// What every contributor added, once all of them are done
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    pub results: Vec<SearchResult>,
    pub common: SearchResultsCommon,
    pub errors: Vec<AppError>,
    pub alert: Option<SearchAlert>,
}

/// Collects results and statistics from all result-type searches of one leaf.
///
/// Contributors build their results and `SearchResultsCommon` privately and
/// hand them over in a single `add` call; this is the only place the shared
/// state is mutated.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Mutex<AggregatorState>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &self,
        result_type: ResultType,
        results: Vec<SearchResult>,
        common: Option<&SearchResultsCommon>,
        err: Option<AppError>,
    ) {
        let mut state = self.state.lock();

        if let Some(err) = err {
            if err.is_cancellation() {
                debug!(result_type = %result_type, "Dropping error caused by cancellation");
            } else {
                warn!(result_type = %result_type, error = %err, "Result type search failed");
                state.errors.push(err);
            }
        }

        for result in results {
            let file_match = match result {
                SearchResult::File(file_match) => file_match,
                other => {
                    state.results.push(other);
                    continue;
                }
            };

            let uri = file_match.uri();
            match state.file_index.get(&uri).copied() {
                Some(position) => {
                    // Same file found by another result type
                    if let Some(existing) = state.results[position].as_file_match_mut() {
                        if result_type == ResultType::Symbol {
                            existing.symbols = file_match.symbols;
                        } else {
                            existing.line_matches = file_match.line_matches;
                            existing.limit_hit |= file_match.limit_hit;
                        }
                    }
                }
                None => {
                    let position = state.results.len();
                    state.file_index.insert(uri, position);
                    state.results.push(SearchResult::File(file_match));
                }
            }
        }

        if let Some(common) = common {
            state.common.update(common);
        }
    }

    /// Record a failure not tied to a result type's own search
    pub fn add_error(&self, err: AppError) {
        warn!(error = %err, "Search task failed");
        self.state.lock().errors.push(err);
    }

    /// Keep the first alert raised by any contributor
    pub fn set_alert(&self, alert: SearchAlert) {
        let mut state = self.state.lock();
        if state.alert.is_none() {
            debug!(alert = %alert.prometheus_type, "Search alert raised");
            state.alert = Some(alert);
        }
    }

    pub fn has_results(&self) -> bool {
        !self.state.lock().results.is_empty()
    }

    /// Take everything collected so far
    pub fn finish(&self) -> AggregateOutcome {
        let state = std::mem::take(&mut *self.state.lock());
        AggregateOutcome {
            results: state.results,
            common: state.common,
            errors: state.errors,
            alert: state.alert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileMatch, LineMatch, Repo, SymbolMatch};

    fn file(path: &str) -> FileMatch {
        FileMatch::new(Repo::new(1, "r"), "c", path)
    }

    #[test]
    fn test_merges_same_file_across_types() {
        let aggregator = Aggregator::new();

        let mut text = file("a.go");
        text.line_matches.push(LineMatch {
            preview: "foo".to_string(),
            line_number: 0,
            offset_and_lengths: vec![(0, 3)],
            limit_hit: false,
        });
        let mut symbol = file("a.go");
        symbol.symbols.push(SymbolMatch {
            name: "foo".to_string(),
            kind: "func".to_string(),
            parent: None,
            line: 0,
        });

        aggregator.add(ResultType::File, vec![text.into()], None, None);
        aggregator.add(ResultType::Symbol, vec![symbol.into(), file("b.go").into()], None, None);

        let outcome = aggregator.finish();
        assert_eq!(outcome.results.len(), 2);
        let merged = outcome.results[0].as_file_match().unwrap();
        assert_eq!(merged.line_matches.len(), 1);
        assert_eq!(merged.symbols.len(), 1);
    }

    #[test]
    fn test_cancellation_errors_dropped() {
        let aggregator = Aggregator::new();
        aggregator.add(ResultType::File, Vec::new(), None, Some(AppError::Cancelled));
        aggregator.add(
            ResultType::Repo,
            Vec::new(),
            None,
            Some(AppError::service("index", "down")),
        );
        let outcome = aggregator.finish();
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_common_merged() {
        let aggregator = Aggregator::new();
        let mut a = SearchResultsCommon::new();
        a.result_count = 2;
        let mut b = SearchResultsCommon::new();
        b.result_count = 3;
        b.limit_hit = true;
        aggregator.add(ResultType::File, Vec::new(), Some(&a), None);
        aggregator.add(ResultType::Path, Vec::new(), Some(&b), None);

        let common = aggregator.finish().common;
        assert_eq!(common.result_count, 5);
        assert!(common.limit_hit);
    }
}
