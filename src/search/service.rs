//! Search service facade

use super::commits::CommitSearcher;
use super::metrics::SEARCH_METRICS;
use super::pipeline::{SearchArgs, SearchBackends, SearchPipeline};
use super::timeout::{longer, search_timeout};
use crate::aggregate::{ExcludedRepos, SearchResults, SearchResultsCommon};
use crate::config::Config;
use crate::error::Result;
use crate::evaluate::{partition_search_pattern, Evaluator, Field, QueryNode};
use crate::index::{IndexSearcher, IndexService};
use crate::models::{RepositoryRevisions, SearchAlert};
use crate::unindexed::{BackendSearcher, RevisionResolver, UnindexedSearcher};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// One search call: the parsed query plus the repositories it resolved to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Top-level query nodes; parameters among them scope every pattern
    pub query: Vec<QueryNode>,

    pub repos: Vec<RepositoryRevisions>,

    /// `repo@rev` entries whose revision could not be resolved
    #[serde(default)]
    pub missing_repo_revs: Vec<String>,

    #[serde(default)]
    pub excluded: ExcludedRepos,
}

impl SearchBackends {
    pub fn new(
        index: Arc<dyn IndexService>,
        backend: Arc<dyn BackendSearcher>,
        resolver: Arc<dyn RevisionResolver>,
        config: Config,
    ) -> Self {
        Self {
            index: IndexSearcher::new(index, config.index.clone()),
            unindexed: UnindexedSearcher::new(backend, resolver, config.unindexed.clone()),
            commits: None,
            config,
        }
    }

    pub fn with_commit_searcher(mut self, commits: Arc<dyn CommitSearcher>) -> Self {
        self.commits = Some(commits);
        self
    }
}

/// Entry point: evaluates a query tree over its repositories under one deadline
pub struct SearchService {
    backends: Arc<SearchBackends>,
}

impl SearchService {
    pub fn new(backends: SearchBackends) -> Self {
        Self {
            backends: Arc::new(backends),
        }
    }

    pub fn config(&self) -> &Config {
        &self.backends.config
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResults> {
        self.search_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Run a search that also stops when `parent` is cancelled
    pub async fn search_with_cancel(
        &self,
        request: SearchRequest,
        parent: &CancellationToken,
    ) -> Result<SearchResults> {
        let start = Instant::now();
        let config = &self.backends.config;

        let (scope, pattern) = partition_search_pattern(request.query);

        if request.repos.is_empty() {
            let results = SearchResults::with_alert(SearchAlert::no_resolved_repos(), start);
            record_response(&results);
            return Ok(results);
        }

        let explicit_timeout = scope.timeout()?;
        let timeout = search_timeout(explicit_timeout, scope.count()?.is_some(), &config.search);
        let deadline = start + timeout;
        let num_repos = request.repos.len();

        let global = !scope.has(Field::Repo)
            && !scope.has(Field::RepoHasFile)
            && request
                .repos
                .iter()
                .all(RepositoryRevisions::is_default_branch_only);
        let args = SearchArgs {
            repos: request.repos,
            global,
            directive: scope.index_directive()?,
            result_types: scope.result_types()?,
            deadline: Some(deadline),
            use_full_deadline: explicit_timeout.is_some(),
            has_commit_time_filter: scope.has_commit_time_filter(),
            start,
        };

        let request_id = Uuid::new_v4();
        info!(
            %request_id,
            repos = num_repos,
            timeout_ms = timeout.as_millis() as u64,
            index = %args.directive,
            "Starting search"
        );

        let cancel = parent.child_token();
        let _guard = cancel.clone().drop_guard();
        let timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
                cancel.cancel();
            })
        };

        let pipeline = SearchPipeline::new(Arc::clone(&self.backends), args, cancel.clone());
        let evaluator = Evaluator::new(
            &pipeline,
            &config.boolean,
            config.search.default_max_results,
        );
        // A query of scope parameters only still searches repository names
        let node = pattern.unwrap_or_else(|| QueryNode::pattern(""));
        let outcome = evaluator.evaluate(&scope, &node).await;
        timer.abort();

        let deadline_passed = Instant::now() >= deadline;
        let mut results = match outcome {
            Ok(Some(results)) => results,
            Ok(None) => SearchResults::new(Vec::new(), SearchResultsCommon::new(), start),
            Err(e) if e.is_cancellation() && deadline_passed => {
                SearchResults::new(Vec::new(), SearchResultsCommon::new(), start)
            }
            Err(e) => {
                error!(%request_id, error = %e, code = e.error_code(), "Search failed");
                SEARCH_METRICS
                    .responses_total
                    .with_label_values(&["error"])
                    .inc();
                return Err(e);
            }
        };

        results.common.excluded.forks += request.excluded.forks;
        results.common.excluded.archived += request.excluded.archived;

        if results.alert.is_none() && results.results.is_empty() {
            let all_timed_out =
                !results.common.timedout.is_empty() && results.common.timedout.len() >= num_repos;
            if deadline_passed || all_timed_out {
                results.alert = Some(SearchAlert::timeout(timeout, longer(2, timeout)));
            }
        }
        if results.alert.is_none() && !request.missing_repo_revs.is_empty() {
            results.alert = Some(SearchAlert::missing_repo_revs(&request.missing_repo_revs));
        }

        results.sort();
        record_response(&results);
        info!(
            %request_id,
            results = results.results.len(),
            matches = results.match_count(),
            limit_hit = results.limit_hit(),
            timedout = results.common.timedout.len(),
            elapsed_ms = results.elapsed_ms(),
            "Search completed"
        );
        Ok(results)
    }
}

fn record_response(results: &SearchResults) {
    let status = match &results.alert {
        Some(alert) if alert.prometheus_type == "timed_out" => "timeout",
        Some(_) => "alert",
        None if !results.common.timedout.is_empty() => "partial_timeout",
        None => "success",
    };
    SEARCH_METRICS
        .responses_total
        .with_label_values(&[status])
        .inc();
    if let Some(alert) = &results.alert {
        SEARCH_METRICS
            .alerts_total
            .with_label_values(&[alert.prometheus_type.as_str()])
            .inc();
    }
}
