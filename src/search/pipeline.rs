//! Per-leaf search pipeline
//!
//! One leaf of the query tree is one pattern. Its requested result types run
//! concurrently under a [`WorkScope`]; each reports into a shared
//! [`Aggregator`].

use super::commits::{check_repo_limit, CommitSearchRequest, CommitSearcher};
use super::files::search_files_in_repos;
use super::repos::search_repositories;
use crate::aggregate::{Aggregator, SearchResults, SearchResultsCommon, WorkScope};
use crate::compiler::CompileMode;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::evaluate::LeafEvaluator;
use crate::index::IndexSearcher;
use crate::models::{
    PatternInfo, RepositoryRevisions, ResultType, SearchAlert, SearchResult,
};
use crate::partition::IndexDirective;
use crate::unindexed::UnindexedSearcher;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Long-lived search collaborators shared by every request
pub struct SearchBackends {
    pub index: IndexSearcher,
    pub unindexed: UnindexedSearcher,
    pub commits: Option<Arc<dyn CommitSearcher>>,
    pub config: Config,
}

/// Request-scoped inputs shared by every leaf of one search call
#[derive(Debug, Clone)]
pub struct SearchArgs {
    pub repos: Vec<RepositoryRevisions>,

    /// No repository filter: search the default branch of the whole index
    pub global: bool,
    pub directive: IndexDirective,
    pub result_types: Vec<ResultType>,
    pub deadline: Option<Instant>,

    /// The caller set an explicit timeout
    pub use_full_deadline: bool,

    /// `after:` or `before:` bound the commit range
    pub has_commit_time_filter: bool,
    pub start: Instant,
}

impl SearchArgs {
    /// Whether a result type must finish before the leaf returns
    fn is_required(&self, result_type: ResultType, types: &[ResultType]) -> bool {
        if self.use_full_deadline {
            return true;
        }
        match result_type {
            ResultType::Repo | ResultType::File | ResultType::Path => true,
            ResultType::Symbol | ResultType::Diff | ResultType::Commit => types.len() == 1,
        }
    }
}

/// Runs leaves of one search call
#[derive(Clone)]
pub struct SearchPipeline {
    backends: Arc<SearchBackends>,
    args: Arc<SearchArgs>,
    cancel: CancellationToken,
}

impl SearchPipeline {
    pub fn new(backends: Arc<SearchBackends>, args: SearchArgs, cancel: CancellationToken) -> Self {
        Self {
            backends,
            args: Arc::new(args),
            cancel,
        }
    }

    pub fn args(&self) -> &SearchArgs {
        &self.args
    }

    /// Run every requested result type for one pattern.
    ///
    /// Errors are dropped when any result was found; otherwise the first
    /// one is returned.
    pub async fn search_leaf(&self, info: &PatternInfo) -> Result<SearchResults> {
        let start = Instant::now();
        let mut types = self.args.result_types.clone();
        if types.is_empty() {
            types = ResultType::defaults();
        }
        if info.is_structural() {
            types = vec![ResultType::File];
        }
        // Path matches are file results: search both at once
        if types.contains(&ResultType::File) {
            types.retain(|t| *t != ResultType::Path);
        } else if types.contains(&ResultType::Path) {
            types.retain(|t| *t != ResultType::Path);
            types.push(ResultType::File);
        }
        if info.is_empty() {
            // Nothing to match in contents or symbols
            types.retain(|t| matches!(t, ResultType::Repo | ResultType::File));
        }

        let aggregator = Arc::new(Aggregator::new());
        let mut scope = WorkScope::new(
            &self.cancel,
            start,
            self.backends.config.search.optional_grace(),
        );

        for &result_type in &types {
            let required = self.args.is_required(result_type, &types);
            let cancel = if required {
                self.cancel.clone()
            } else {
                scope.optional_token()
            };
            let task = run_result_type(
                Arc::clone(&self.backends),
                Arc::clone(&self.args),
                info.clone(),
                result_type,
                Arc::clone(&aggregator),
                cancel,
            );
            if required {
                scope.spawn_required(task);
            } else {
                scope.spawn_optional(task);
            }
        }
        for failure in scope.wait().await {
            aggregator.add_error(failure);
        }

        let outcome = aggregator.finish();
        if outcome.results.is_empty() && outcome.alert.is_none() {
            let mut errors = outcome.errors.into_iter();
            if let Some(first) = errors.next() {
                for other in errors {
                    warn!(error = %other, "Additional search error");
                }
                return Err(first);
            }
        } else if !outcome.errors.is_empty() {
            debug!(errors = outcome.errors.len(), "Dropping errors, results were found");
        }

        let mut results = SearchResults::new(outcome.results, outcome.common, self.args.start);
        results.alert = outcome.alert;
        debug!(
            pattern = %info.pattern,
            results = results.results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Leaf search completed"
        );
        Ok(results)
    }
}

async fn run_result_type(
    backends: Arc<SearchBackends>,
    args: Arc<SearchArgs>,
    info: PatternInfo,
    result_type: ResultType,
    aggregator: Arc<Aggregator>,
    cancel: CancellationToken,
) {
    match search_result_type(&backends, &args, &info, result_type, &cancel).await {
        Ok(TypeOutcome::Results(results, common)) => {
            aggregator.add(result_type, results, Some(&common), None)
        }
        Ok(TypeOutcome::Alert(alert)) => aggregator.set_alert(alert),
        Err(e) => aggregator.add(result_type, Vec::new(), None, Some(e)),
    }
}

enum TypeOutcome {
    Results(Vec<SearchResult>, SearchResultsCommon),
    Alert(SearchAlert),
}

async fn search_result_type(
    backends: &SearchBackends,
    args: &SearchArgs,
    info: &PatternInfo,
    result_type: ResultType,
    cancel: &CancellationToken,
) -> Result<TypeOutcome> {
    match result_type {
        ResultType::Repo => {
            let (results, common) = search_repositories(info, &args.repos)?;
            Ok(TypeOutcome::Results(results, common))
        }
        ResultType::File | ResultType::Path => {
            let (matches, common) =
                search_files_in_repos(backends, args, info, CompileMode::Text, cancel).await?;
            Ok(TypeOutcome::Results(
                matches.into_iter().map(SearchResult::File).collect(),
                common,
            ))
        }
        ResultType::Symbol => {
            let (matches, common) =
                search_files_in_repos(backends, args, info, CompileMode::Symbol, cancel).await?;
            Ok(TypeOutcome::Results(
                matches.into_iter().map(SearchResult::File).collect(),
                common,
            ))
        }
        ResultType::Diff | ResultType::Commit => {
            if let Some(alert) = check_repo_limit(
                result_type,
                args.repos.len(),
                args.has_commit_time_filter,
                backends.config.limits.diff_commit_repo_limit,
            ) {
                return Ok(TypeOutcome::Alert(alert));
            }
            let Some(commits) = &backends.commits else {
                debug!(result_type = %result_type, "No commit searcher configured");
                return Ok(TypeOutcome::Results(Vec::new(), SearchResultsCommon::new()));
            };
            let (matches, common) = commits
                .search(&CommitSearchRequest {
                    info,
                    repos: &args.repos,
                    diff: result_type == ResultType::Diff,
                    cancel,
                })
                .await?;
            Ok(TypeOutcome::Results(
                matches.into_iter().map(SearchResult::Commit).collect(),
                common,
            ))
        }
    }
}

#[async_trait]
impl LeafEvaluator for SearchPipeline {
    async fn evaluate_leaf(&self, info: PatternInfo) -> Result<Option<SearchResults>> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let results = self.search_leaf(&info).await?;

        // Structural matches are expensive to find: retry once with a higher limit
        let retry_limit = self.backends.config.search.structural_retry_file_match_limit;
        if info.is_structural()
            && results.results.is_empty()
            && results.alert.is_none()
            && info.file_match_limit < retry_limit
        {
            info!(limit = retry_limit, "Structural search found nothing, retrying with a higher limit");
            return self
                .search_leaf(&info.with_file_match_limit(retry_limit))
                .await
                .map(Some);
        }
        Ok(Some(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::models::{CommitMatch, PatternType, Repo};
    use crate::unindexed::InMemoryBackend;
    use std::time::Duration;

    /// Finds one commit after a short delay, or panics when asked to
    struct FakeCommits {
        latency: Duration,
        panic: bool,
    }

    #[async_trait]
    impl CommitSearcher for FakeCommits {
        async fn search(
            &self,
            request: &CommitSearchRequest<'_>,
        ) -> Result<(Vec<CommitMatch>, SearchResultsCommon)> {
            if self.panic {
                panic!("commit searcher crashed");
            }
            tokio::select! {
                _ = request.cancel.cancelled() => Err(AppError::Cancelled),
                _ = tokio::time::sleep(self.latency) => Ok((
                    vec![CommitMatch {
                        repo: Repo::new(1, "r"),
                        commit: "c0ffee".to_string(),
                        message: "fix".to_string(),
                        diff_preview: None,
                    }],
                    SearchResultsCommon::new(),
                )),
            }
        }
    }

    fn pipeline(commits: FakeCommits, args: SearchArgs) -> SearchPipeline {
        let backend = Arc::new(InMemoryBackend::new(vec!["backend-0".to_string()]));
        let backends = SearchBackends::new(
            Arc::new(InMemoryIndex::new()),
            backend.clone(),
            backend,
            Config::default(),
        )
        .with_commit_searcher(Arc::new(commits));
        SearchPipeline::new(Arc::new(backends), args, CancellationToken::new())
    }

    fn args(use_full_deadline: bool) -> SearchArgs {
        SearchArgs {
            repos: Vec::new(),
            global: false,
            directive: IndexDirective::Yes,
            result_types: ResultType::defaults(),
            deadline: None,
            use_full_deadline,
            has_commit_time_filter: false,
            start: Instant::now(),
        }
    }

    #[test]
    fn test_required_types() {
        let types = vec![ResultType::File, ResultType::Symbol];
        let args = args(false);
        assert!(args.is_required(ResultType::File, &types));
        assert!(!args.is_required(ResultType::Symbol, &types));
        assert!(args.is_required(ResultType::Symbol, &[ResultType::Symbol]));
    }

    #[test]
    fn test_explicit_timeout_makes_everything_required() {
        let types = vec![ResultType::File, ResultType::Diff];
        assert!(args(true).is_required(ResultType::Diff, &types));
    }

    #[tokio::test]
    async fn test_optional_grace_counts_from_leaf_start() {
        // A leaf that starts long after the search began, as a retry or a late AND operand does
        let mut args = args(false);
        args.result_types = vec![ResultType::Repo, ResultType::Commit];
        args.start = Instant::now()
            .checked_sub(Duration::from_secs(60))
            .unwrap_or_else(Instant::now);
        let commits = FakeCommits {
            latency: Duration::from_millis(20),
            panic: false,
        };
        let info = PatternInfo::new("fix", PatternType::Literal, 30);

        let results = pipeline(commits, args).search_leaf(&info).await.unwrap();
        assert_eq!(results.results.len(), 1);
        assert!(matches!(results.results[0], SearchResult::Commit(_)));
    }

    #[tokio::test]
    async fn test_crashed_required_task_fails_the_leaf() {
        let mut args = args(false);
        args.result_types = vec![ResultType::Commit];
        let commits = FakeCommits {
            latency: Duration::ZERO,
            panic: true,
        };
        let info = PatternInfo::new("fix", PatternType::Literal, 30);

        let err = pipeline(commits, args).search_leaf(&info).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
