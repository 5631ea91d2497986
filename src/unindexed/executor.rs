//! Concurrent per-repository search against the backend search service

use super::client::{
    BackendSearchRequest, BackendSearchResponse, BackendSearcher, RepoSearchError,
    RevisionResolver,
};
use super::endpoints::rendezvous_endpoint;
use super::flatten::flatten_file_matches;
use super::limiter::MutableLimiter;
use crate::aggregate::SearchResultsCommon;
use crate::compiler::BackendPattern;
use crate::config::UnindexedConfig;
use crate::error::{AppError, Result};
use crate::models::{FileMatch, PatternInfo, RepositoryRevisions};
use crate::search::metrics::SEARCH_METRICS;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// One fan-out over unindexed repositories
#[derive(Debug, Clone, Copy)]
pub struct UnindexedSearchRequest<'a> {
    pub info: &'a PatternInfo,
    pub pattern: &'a BackendPattern,
    pub repos: &'a [RepositoryRevisions],
    pub deadline: Option<Instant>,

    /// The caller set an explicit timeout: give every repository the full deadline
    pub use_full_deadline: bool,
}

/// Per-repository match groups plus statistics
#[derive(Debug, Clone, Default)]
pub struct UnindexedOutcome {
    pub groups: Vec<Vec<FileMatch>>,
    pub common: SearchResultsCommon,
}

impl UnindexedOutcome {
    /// Fairness-balanced matches, at most `limit`
    pub fn into_flattened(self, limit: usize) -> (Vec<FileMatch>, SearchResultsCommon) {
        (flatten_file_matches(self.groups, limit), self.common)
    }
}

/// Searches repositories the index does not cover
pub struct UnindexedSearcher {
    backend: Arc<dyn BackendSearcher>,
    resolver: Arc<dyn RevisionResolver>,
    limiter: Arc<MutableLimiter>,
    config: UnindexedConfig,
}

impl UnindexedSearcher {
    pub fn new(
        backend: Arc<dyn BackendSearcher>,
        resolver: Arc<dyn RevisionResolver>,
        config: UnindexedConfig,
    ) -> Self {
        let limiter = MutableLimiter::new(config.requests_per_endpoint);
        Self {
            backend,
            resolver,
            limiter,
            config,
        }
    }

    pub fn limiter(&self) -> &Arc<MutableLimiter> {
        &self.limiter
    }

    /// Per-repository budget for one backend request
    pub fn fetch_timeout(&self, num_repos: usize, deadline: Option<Instant>, use_full_deadline: bool) -> Duration {
        if num_repos == 1 || use_full_deadline {
            match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => self.config.single_repo_fetch_timeout(),
            }
        } else {
            self.config.fetch_timeout()
        }
    }

    /// Search every repository concurrently.
    ///
    /// Per-repository failures are classified into `common`. A fatal failure
    /// cancels the siblings and is returned, unless the cancellation scope
    /// was already cancelled or the match limit was exceeded.
    pub async fn search(
        &self,
        request: &UnindexedSearchRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<UnindexedOutcome> {
        if request.repos.is_empty() {
            return Ok(UnindexedOutcome::default());
        }

        for reporev in request.repos {
            if reporev.revs.len() > 1 {
                return Err(RepoSearchError::MultipleRevisionsNotSupported {
                    repo: reporev.repo.name.clone(),
                    count: reporev.revs.len(),
                }
                .into());
            }
        }

        let endpoints = self.backend.endpoints();
        if endpoints.is_empty() {
            return Err(AppError::service("backend", "no backend instances available"));
        }
        self.limiter
            .set_limit(endpoints.len() * self.config.requests_per_endpoint);

        let fetch_timeout =
            self.fetch_timeout(request.repos.len(), request.deadline, request.use_full_deadline);
        debug!(
            repos = request.repos.len(),
            endpoints = endpoints.len(),
            fetch_timeout_ms = fetch_timeout.as_millis() as u64,
            "Searching unindexed repositories"
        );

        let scope = cancel.child_token();
        let state = Arc::new(Mutex::new(FanOutState::default()));
        let ctx = Arc::new(RepoSearchContext {
            backend: Arc::clone(&self.backend),
            resolver: Arc::clone(&self.resolver),
            limiter: Arc::clone(&self.limiter),
            pattern: request.pattern.clone(),
            repo_has_file_include: request.info.repo_has_file_include.clone(),
            repo_has_file_exclude: request.info.repo_has_file_exclude.clone(),
            path_case_sensitive: request.info.path_patterns_are_case_sensitive,
            fetch_timeout,
            max_attempts: self.config.max_attempts.max(1),
            deadline: request.deadline,
            file_match_limit: request.info.file_match_limit,
        });

        let mut tasks = JoinSet::new();
        for reporev in request.repos.iter().cloned() {
            let ctx = Arc::clone(&ctx);
            let state = Arc::clone(&state);
            let scope = scope.clone();
            tasks.spawn(async move {
                let outcome = ctx.search_repo(&reporev, &scope).await;
                ctx.record(&state, &reporev, outcome, &scope);
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Repository search task failed");
            }
        }

        let state = std::mem::take(&mut *state.lock());
        if let Some(err) = state.fatal {
            if !state.over_limit_canceled && !cancel.is_cancelled() {
                return Err(err.into());
            }
        }

        Ok(UnindexedOutcome {
            groups: state.groups,
            common: state.common,
        })
    }
}

#[derive(Debug, Default)]
struct FanOutState {
    groups: Vec<Vec<FileMatch>>,
    flattened_size: usize,
    common: SearchResultsCommon,
    over_limit_canceled: bool,
    fatal: Option<RepoSearchError>,
}

#[derive(Debug, Default)]
struct RepoOutcome {
    matches: Vec<FileMatch>,
    limit_hit: bool,
    timed_out: bool,
    err: Option<RepoSearchError>,
}

impl RepoOutcome {
    fn failed(err: RepoSearchError) -> Self {
        Self {
            err: Some(err),
            ..Default::default()
        }
    }
}

struct RepoSearchContext {
    backend: Arc<dyn BackendSearcher>,
    resolver: Arc<dyn RevisionResolver>,
    limiter: Arc<MutableLimiter>,
    pattern: BackendPattern,
    repo_has_file_include: Vec<String>,
    repo_has_file_exclude: Vec<String>,
    path_case_sensitive: bool,
    fetch_timeout: Duration,
    max_attempts: usize,
    deadline: Option<Instant>,
    file_match_limit: usize,
}

impl RepoSearchContext {
    async fn search_repo(&self, reporev: &RepositoryRevisions, scope: &CancellationToken) -> RepoOutcome {
        if scope.is_cancelled() {
            return RepoOutcome::failed(RepoSearchError::Cancelled);
        }

        // Ref-globs are expanded to commits before this point
        let Some(rev) = reporev.single_rev() else {
            return RepoOutcome::failed(RepoSearchError::UnexpandedRevision {
                repo: reporev.repo.name.clone(),
                rev: reporev
                    .revs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(":"),
            });
        };

        let waited = Instant::now();
        let _permit = match self.limiter.acquire(scope).await {
            Ok(permit) => permit,
            Err(e) => return RepoOutcome::failed(e),
        };
        SEARCH_METRICS
            .limiter_wait
            .observe(waited.elapsed().as_secs_f64());

        let commit = match self.resolver.resolve(&reporev.repo, rev).await {
            Ok(commit) => commit,
            Err(e) => return RepoOutcome::failed(e),
        };

        match self.passes_repo_filters(&reporev.repo.name, &commit, scope).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(repo = %reporev.repo.name, "Skipping repository failing repohasfile filter");
                return RepoOutcome::default();
            }
            Err(e) => return RepoOutcome::failed(e),
        }

        let request = BackendSearchRequest {
            repo: reporev.repo.name.clone(),
            commit: commit.clone(),
            pattern: self.pattern.clone(),
            fetch_timeout: self.fetch_timeout,
        };
        let response = match self.search_with_retry(&request, scope).await {
            Ok(response) => response,
            Err(e) => return RepoOutcome::failed(e),
        };

        let timed_out = response.deadline_hit && response.matches.is_empty();
        let limit_hit = response.limit_hit || (response.deadline_hit && !response.matches.is_empty());
        let input_rev = if rev.is_empty() {
            None
        } else {
            Some(rev.to_string())
        };
        let matches = response
            .matches
            .into_iter()
            .map(|m| FileMatch {
                repo: reporev.repo.clone(),
                commit: commit.clone(),
                input_rev: input_rev.clone(),
                path: m.path,
                line_matches: m.line_matches,
                symbols: Vec::new(),
                limit_hit: m.limit_hit,
            })
            .collect();

        RepoOutcome {
            matches,
            limit_hit,
            timed_out,
            err: None,
        }
    }

    /// Check "repository must (not) contain a file matching P" with path-only probes
    async fn passes_repo_filters(
        &self,
        repo: &str,
        commit: &str,
        scope: &CancellationToken,
    ) -> std::result::Result<bool, RepoSearchError> {
        let probes = self
            .repo_has_file_include
            .iter()
            .map(|p| (p, true))
            .chain(self.repo_has_file_exclude.iter().map(|p| (p, false)));
        for (pattern, must_contain) in probes {
            let request = BackendSearchRequest {
                repo: repo.to_string(),
                commit: commit.to_string(),
                pattern: BackendPattern::path_probe(pattern, self.path_case_sensitive),
                fetch_timeout: self.fetch_timeout,
            };
            let found = !self
                .search_with_retry(&request, scope)
                .await?
                .matches
                .is_empty();
            if found != must_contain {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Retry a retryable failure once per attempt on an instance not tried yet
    async fn search_with_retry(
        &self,
        request: &BackendSearchRequest,
        scope: &CancellationToken,
    ) -> std::result::Result<BackendSearchResponse, RepoSearchError> {
        let endpoints = self.backend.endpoints();
        let key = format!("{}@{}", request.repo, request.commit);
        let mut excluded = HashSet::new();
        let mut last_err = RepoSearchError::NoEndpoints;

        for attempt in 1..=self.max_attempts {
            // Stop issuing sub-requests once cancelled; in-flight calls finish on their own
            if scope.is_cancelled() {
                return Err(RepoSearchError::Cancelled);
            }
            let Some(endpoint) = rendezvous_endpoint(&key, &endpoints, &excluded) else {
                break;
            };

            let start = Instant::now();
            let result = tokio::time::timeout(
                request.fetch_timeout,
                self.backend.search(&endpoint, request),
            )
            .await
            .unwrap_or(Err(RepoSearchError::Timeout));

            let outcome = match &result {
                Ok(_) => "success",
                Err(RepoSearchError::Timeout) => "timeout",
                Err(_) => "error",
            };
            SEARCH_METRICS
                .backend_request_duration
                .with_label_values(&[outcome])
                .observe(start.elapsed().as_secs_f64());

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        repo = %request.repo,
                        endpoint = %endpoint,
                        error = %e,
                        "Backend instance failed, retrying on another instance"
                    );
                    SEARCH_METRICS
                        .backend_retries
                        .with_label_values(&["unavailable"])
                        .inc();
                    excluded.insert(endpoint);
                    last_err = e;
                }
                other => return other,
            }
        }
        Err(last_err)
    }

    /// Fold one repository's outcome into the shared state
    fn record(
        &self,
        state: &Mutex<FanOutState>,
        reporev: &RepositoryRevisions,
        mut outcome: RepoOutcome,
        scope: &CancellationToken,
    ) {
        if matches!(outcome.err, Some(RepoSearchError::Cancelled)) {
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                outcome.err = None;
                outcome.timed_out = true;
            } else {
                // Cancelled by a sibling or the caller: nothing to report
                return;
            }
        }

        let mut state = state.lock();
        let fatal = handle_repo_search_result(
            &mut state.common,
            reporev,
            outcome.limit_hit,
            outcome.timed_out,
            outcome.err,
        );
        if outcome.limit_hit {
            state.common.partial.insert(reporev.repo.name.clone());
        }

        if let Some(err) = fatal {
            if state.fatal.is_none() && !state.over_limit_canceled {
                error!(repo = %reporev.repo.name, error = %err, "Repository search failed");
                state.fatal = Some(err);
                scope.cancel();
            }
        }

        if !outcome.matches.is_empty() {
            state.flattened_size += outcome.matches.len();
            state.common.result_count += outcome
                .matches
                .iter()
                .map(FileMatch::result_count)
                .sum::<usize>();
            state.groups.push(outcome.matches);

            if state.flattened_size > self.file_match_limit && !state.over_limit_canceled {
                debug!(
                    matches = state.flattened_size,
                    limit = self.file_match_limit,
                    "Match limit exceeded, cancelling remaining repository searches"
                );
                state.over_limit_canceled = true;
                state.common.limit_hit = true;
                scope.cancel();
            }
        }
    }
}

/// Classify one repository's result into `common`.
///
/// Returns the error when it should fail the whole search.
pub fn handle_repo_search_result(
    common: &mut SearchResultsCommon,
    reporev: &RepositoryRevisions,
    limit_hit: bool,
    timed_out: bool,
    err: Option<RepoSearchError>,
) -> Option<RepoSearchError> {
    common.limit_hit |= limit_hit;

    let mut fatal = None;
    match err {
        Some(RepoSearchError::CloneInProgress(_)) => {
            common.cloning.insert(reporev.repo.clone());
        }
        Some(RepoSearchError::RepoNotFound(_)) => {
            common.missing.insert(reporev.repo.clone());
        }
        Some(e @ RepoSearchError::RevisionNotFound { .. }) => {
            // Without an explicit revision this is just an empty repository
            if !reporev.is_default_branch_only() {
                fatal = Some(e);
            }
        }
        Some(e) if e.is_temporary() => {
            common.timedout.insert(reporev.repo.clone());
        }
        Some(e) => fatal = Some(e),
        None if timed_out => {
            common.timedout.insert(reporev.repo.clone());
        }
        None => {}
    }
    common.searched.insert(reporev.repo.clone());
    fatal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Repo, RevisionSpecifier};

    fn head(id: i32, name: &str) -> RepositoryRevisions {
        RepositoryRevisions::head(Repo::new(id, name))
    }

    #[test]
    fn test_classification() {
        let mut common = SearchResultsCommon::new();
        let a = head(1, "a");

        assert!(handle_repo_search_result(
            &mut common,
            &a,
            false,
            false,
            Some(RepoSearchError::CloneInProgress("a".to_string()))
        )
        .is_none());
        assert!(common.cloning.contains(&a.repo));

        let b = head(2, "b");
        handle_repo_search_result(
            &mut common,
            &b,
            false,
            false,
            Some(RepoSearchError::RepoNotFound("b".to_string())),
        );
        assert!(common.missing.contains(&b.repo));

        let c = head(3, "c");
        handle_repo_search_result(&mut common, &c, false, true, None);
        assert!(common.timedout.contains(&c.repo));

        let d = head(4, "d");
        handle_repo_search_result(&mut common, &d, false, false, Some(RepoSearchError::Timeout));
        assert!(common.timedout.contains(&d.repo));

        assert_eq!(common.searched.len(), 4);
        assert!(!common.limit_hit);
    }

    #[test]
    fn test_unexpanded_revision_is_fatal() {
        let mut common = SearchResultsCommon::new();
        let reporev = RepositoryRevisions::new(
            Repo::new(1, "a"),
            vec![RevisionSpecifier::ref_glob("refs/tags/*")],
        );
        let fatal = handle_repo_search_result(
            &mut common,
            &reporev,
            false,
            false,
            Some(RepoSearchError::UnexpandedRevision {
                repo: "a".to_string(),
                rev: "*refs/tags/*".to_string(),
            }),
        );
        assert!(AppError::from(fatal.unwrap()).is_bad_request());
        assert!(common.timedout.is_empty());
    }

    #[test]
    fn test_revision_not_found() {
        let mut common = SearchResultsCommon::new();
        let err = || RepoSearchError::RevisionNotFound {
            repo: "a".to_string(),
            rev: "v2".to_string(),
        };

        // Default branch of an empty repository
        assert!(handle_repo_search_result(&mut common, &head(1, "a"), false, false, Some(err())).is_none());

        let explicit = RepositoryRevisions::new(
            Repo::new(1, "a"),
            vec![RevisionSpecifier::explicit("v2")],
        );
        assert_eq!(
            handle_repo_search_result(&mut common, &explicit, false, false, Some(err())),
            Some(err())
        );
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let mut common = SearchResultsCommon::new();
        let fatal = handle_repo_search_result(
            &mut common,
            &head(1, "a"),
            true,
            false,
            Some(RepoSearchError::Backend("boom".to_string())),
        );
        assert!(fatal.is_some());
        assert!(common.limit_hit);
    }
}
