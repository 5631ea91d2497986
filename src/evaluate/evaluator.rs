//! AND/OR evaluation over the query tree

use super::leaf::pattern_info;
use super::merge::{intersect_merge, union_merge};
use super::query::{QueryNode, ScopeParameters, MAX_COUNT};
use crate::aggregate::SearchResults;
use crate::config::BooleanConfig;
use crate::error::Result;
use crate::models::{PatternInfo, SearchAlert};
use crate::search::metrics::SEARCH_METRICS;
use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use std::time::Instant;
use tracing::{debug, warn};

/// Runs the search for a single pattern
#[async_trait]
pub trait LeafEvaluator: Send + Sync {
    /// `None` means the leaf produced no result at all (not even an empty one)
    async fn evaluate_leaf(&self, info: PatternInfo) -> Result<Option<SearchResults>>;
}

/// Walks the query tree, evaluating leaves through a [`LeafEvaluator`]
pub struct Evaluator<'a> {
    leaf: &'a dyn LeafEvaluator,
    config: &'a BooleanConfig,
    default_max_results: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(leaf: &'a dyn LeafEvaluator, config: &'a BooleanConfig, default_max_results: usize) -> Self {
        Self {
            leaf,
            config,
            default_max_results,
        }
    }

    pub fn evaluate<'b>(
        &'b self,
        scope: &'b ScopeParameters,
        node: &'b QueryNode,
    ) -> BoxFuture<'b, Result<Option<SearchResults>>> {
        async move {
            match node {
                // Scope parameters are folded into leaves, never evaluated alone
                QueryNode::Parameter(_) => Ok(None),
                QueryNode::Pattern { .. } | QueryNode::Concat { .. } => {
                    let info = pattern_info(scope, node, self.default_max_results)?;
                    self.leaf.evaluate_leaf(info).await
                }
                QueryNode::And { operands } => self.evaluate_and(scope, operands).await,
                QueryNode::Or { operands } => self.evaluate_or(scope, operands).await,
            }
        }
        .boxed()
    }

    /// Intersect the operands' file matches.
    ///
    /// Operands are asked for an inflated count. While the intersection is
    /// short of what was wanted and some operand was cut off by its limit,
    /// the count doubles and the round repeats, up to the retry ceiling.
    async fn evaluate_and(
        &self,
        scope: &ScopeParameters,
        operands: &[QueryNode],
    ) -> Result<Option<SearchResults>> {
        if operands.is_empty() {
            return Ok(None);
        }

        let want = scope.count()?.unwrap_or(self.config.and_default_count);
        let mut try_count = want.saturating_mul(self.config.and_inflation.max(1));

        for attempt in 1..=self.config.and_max_attempts.max(1) {
            SEARCH_METRICS.boolean_rounds.with_label_values(&["and"]).inc();

            let scoped = scope.with_count(try_count.min(MAX_COUNT));
            let evaluated =
                try_join_all(operands.iter().map(|operand| self.evaluate(&scoped, operand))).await?;

            let mut exhausted = true;
            let mut merged: Option<SearchResults> = None;
            for result in evaluated {
                let Some(result) = result else {
                    return Ok(None);
                };
                exhausted &= !result.limit_hit();
                merged = Some(match merged {
                    None => result,
                    Some(acc) => intersect_merge(acc, result),
                });
            }
            let Some(mut result) = merged else {
                return Ok(None);
            };

            if exhausted || result.results.len() >= want {
                result.common.limit_hit = !exhausted;
                return Ok(Some(result));
            }

            try_count = try_count.saturating_mul(2);
            if try_count > self.config.max_results_for_retry {
                break;
            }
            debug!(
                attempt = attempt,
                found = result.results.len(),
                want = want,
                try_count = try_count,
                "AND expression short of results, retrying with a larger count"
            );
        }

        warn!(want = want, "AND expression hit the retry ceiling");
        Ok(Some(SearchResults::with_alert(
            SearchAlert::capped_and_expression(),
            Instant::now(),
        )))
    }

    /// Union operands left to right until enough results are found
    async fn evaluate_or(
        &self,
        scope: &ScopeParameters,
        operands: &[QueryNode],
    ) -> Result<Option<SearchResults>> {
        let Some((first, rest)) = operands.split_first() else {
            return Ok(None);
        };
        SEARCH_METRICS.boolean_rounds.with_label_values(&["or"]).inc();

        let want = scope.count()?.unwrap_or(self.default_max_results);

        let mut result = self.evaluate(scope, first).await?;
        if let Some(r) = result.as_mut() {
            if r.results.len() >= want {
                r.truncate(want);
                return Ok(result);
            }
        }

        for operand in rest {
            let Some(next) = self.evaluate(scope, operand).await? else {
                continue;
            };
            let mut merged = match result.take() {
                Some(acc) => union_merge(acc, next),
                None => next,
            };
            if merged.results.len() >= want {
                merged.truncate(want);
                return Ok(Some(merged));
            }
            result = Some(merged);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SearchResultsCommon;
    use crate::evaluate::query::{Field, Parameter};
    use crate::models::{FileMatch, Repo, SearchResult};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Leaf returning canned files per pattern, truncated to the requested count
    #[derive(Default)]
    struct FakeLeaf {
        files: HashMap<String, Vec<String>>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl FakeLeaf {
        fn with(mut self, pattern: &str, paths: &[&str]) -> Self {
            self.files
                .insert(pattern.to_string(), paths.iter().map(|p| p.to_string()).collect());
            self
        }

        fn calls(&self) -> Vec<(String, usize)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl LeafEvaluator for FakeLeaf {
        async fn evaluate_leaf(&self, info: PatternInfo) -> Result<Option<SearchResults>> {
            self.calls
                .lock()
                .push((info.pattern.clone(), info.file_match_limit));
            let paths = self.files.get(&info.pattern).cloned().unwrap_or_default();
            let mut common = SearchResultsCommon::new();
            common.limit_hit = paths.len() > info.file_match_limit;
            let results = paths
                .iter()
                .take(info.file_match_limit)
                .map(|p| SearchResult::File(FileMatch::new(Repo::new(1, "r"), "c", p.as_str())))
                .collect();
            Ok(Some(SearchResults::new(results, common, Instant::now())))
        }
    }

    fn count(n: usize) -> ScopeParameters {
        ScopeParameters::new(vec![Parameter::new(Field::Count, n.to_string())])
    }

    fn paths(results: &SearchResults) -> Vec<String> {
        let mut paths: Vec<String> = results
            .results
            .iter()
            .filter_map(|r| r.as_file_match().map(|f| f.path.clone()))
            .collect();
        paths.sort();
        paths
    }

    #[tokio::test]
    async fn test_and_intersects() {
        let leaf = FakeLeaf::default()
            .with("x", &["a", "b", "c"])
            .with("y", &["b", "c", "d"]);
        let config = BooleanConfig::default();
        let evaluator = Evaluator::new(&leaf, &config, 30);
        let node = QueryNode::and(vec![QueryNode::pattern("x"), QueryNode::pattern("y")]);

        let result = evaluator
            .evaluate(&ScopeParameters::default(), &node)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paths(&result), vec!["b", "c"]);
        assert!(!result.limit_hit());
        // Default want of 5, inflated twice
        assert!(leaf.calls().iter().all(|(_, limit)| *limit == 10));
    }

    #[tokio::test]
    async fn test_and_doubles_until_enough() {
        let many: Vec<String> = (0..40).map(|i| format!("f{:02}", i)).collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        // Common files only appear late in the first operand's list
        let leaf = FakeLeaf::default()
            .with("x", &many)
            .with("y", &many[30..]);
        let config = BooleanConfig::default();
        let evaluator = Evaluator::new(&leaf, &config, 30);
        let node = QueryNode::and(vec![QueryNode::pattern("x"), QueryNode::pattern("y")]);

        let result = evaluator.evaluate(&count(2), &node).await.unwrap().unwrap();
        assert!(result.results.len() >= 2);
        let limits: Vec<usize> = leaf
            .calls()
            .into_iter()
            .filter(|(p, _)| p == "x")
            .map(|(_, limit)| limit)
            .collect();
        assert_eq!(limits, vec![4, 8, 16, 32]);
    }

    #[tokio::test]
    async fn test_and_capped() {
        let many: Vec<String> = (0..100).map(|i| format!("f{:03}", i)).collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        let leaf = FakeLeaf::default()
            .with("x", &many[..50])
            .with("y", &many[50..]);
        let config = BooleanConfig {
            max_results_for_retry: 16,
            ..BooleanConfig::default()
        };
        let evaluator = Evaluator::new(&leaf, &config, 30);
        let node = QueryNode::and(vec![QueryNode::pattern("x"), QueryNode::pattern("y")]);

        let result = evaluator.evaluate(&count(2), &node).await.unwrap().unwrap();
        assert!(result.results.is_empty());
        assert_eq!(
            result.alert.unwrap().prometheus_type,
            "exceed_and_expression_search_limit"
        );
    }

    #[tokio::test]
    async fn test_and_attempt_budget() {
        let many: Vec<String> = (0..100).map(|i| format!("f{:03}", i)).collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        let leaf = FakeLeaf::default()
            .with("x", &many[..50])
            .with("y", &many[50..]);
        let config = BooleanConfig {
            and_max_attempts: 2,
            ..BooleanConfig::default()
        };
        let evaluator = Evaluator::new(&leaf, &config, 30);
        let node = QueryNode::and(vec![QueryNode::pattern("x"), QueryNode::pattern("y")]);

        let result = evaluator.evaluate(&count(2), &node).await.unwrap().unwrap();
        assert!(result.alert.is_some());
        assert_eq!(leaf.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_and_inflation_stays_within_max_count() {
        let leaf = FakeLeaf::default().with("x", &["a"]).with("y", &["a"]);
        let config = BooleanConfig::default();
        let evaluator = Evaluator::new(&leaf, &config, 30);
        let node = QueryNode::and(vec![QueryNode::pattern("x"), QueryNode::pattern("y")]);

        let result = evaluator
            .evaluate(&count(MAX_COUNT), &node)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paths(&result), vec!["a"]);
        assert!(leaf.calls().iter().all(|(_, limit)| *limit == MAX_COUNT));
    }

    #[tokio::test]
    async fn test_or_short_circuits() {
        let leaf = FakeLeaf::default()
            .with("x", &["x1", "x2"])
            .with("y", &["y1", "y2"]);
        let config = BooleanConfig::default();
        let evaluator = Evaluator::new(&leaf, &config, 30);
        let node = QueryNode::or(vec![
            QueryNode::pattern("x"),
            QueryNode::pattern("y"),
            QueryNode::pattern("z"),
        ]);

        let result = evaluator.evaluate(&count(2), &node).await.unwrap().unwrap();
        assert_eq!(paths(&result), vec!["x1", "x2"]);
        assert_eq!(leaf.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_or_unions_until_enough() {
        let leaf = FakeLeaf::default()
            .with("x", &["a"])
            .with("y", &["a", "b"])
            .with("z", &["c"]);
        let config = BooleanConfig::default();
        let evaluator = Evaluator::new(&leaf, &config, 30);
        let node = QueryNode::or(vec![
            QueryNode::pattern("x"),
            QueryNode::pattern("y"),
            QueryNode::pattern("z"),
        ]);

        let result = evaluator.evaluate(&count(2), &node).await.unwrap().unwrap();
        assert_eq!(paths(&result), vec!["a", "b"]);
        assert_eq!(leaf.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_operands() {
        let leaf = FakeLeaf::default();
        let config = BooleanConfig::default();
        let evaluator = Evaluator::new(&leaf, &config, 30);
        let scope = ScopeParameters::default();
        assert!(evaluator.evaluate(&scope, &QueryNode::and(vec![])).await.unwrap().is_none());
        assert!(evaluator.evaluate(&scope, &QueryNode::or(vec![])).await.unwrap().is_none());
        let param = QueryNode::Parameter(Parameter::new(Field::Repo, "r"));
        assert!(evaluator.evaluate(&scope, &param).await.unwrap().is_none());
    }
}
