//! Diff and commit search through an external collaborator

use crate::aggregate::SearchResultsCommon;
use crate::error::Result;
use crate::models::{CommitMatch, PatternInfo, RepositoryRevisions, ResultType, SearchAlert};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// One diff or commit search
#[derive(Debug, Clone, Copy)]
pub struct CommitSearchRequest<'a> {
    pub info: &'a PatternInfo,
    pub repos: &'a [RepositoryRevisions],

    /// Search diffs rather than commit messages
    pub diff: bool,
    pub cancel: &'a CancellationToken,
}

/// Searches commit history
#[async_trait]
pub trait CommitSearcher: Send + Sync {
    async fn search(
        &self,
        request: &CommitSearchRequest<'_>,
    ) -> Result<(Vec<CommitMatch>, SearchResultsCommon)>;
}

/// Diff and commit search over too many repositories is refused with an
/// alert, unless the query bounds the commit time range
pub fn check_repo_limit(
    result_type: ResultType,
    num_repos: usize,
    has_time_filter: bool,
    limit: usize,
) -> Option<SearchAlert> {
    if has_time_filter || num_repos <= limit {
        return None;
    }
    Some(SearchAlert::too_many_repos_for_commit_search(
        &result_type.to_string(),
        limit,
    ))
}
