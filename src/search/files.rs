//! Text, path and symbol search over files

use super::pipeline::{SearchArgs, SearchBackends};
use crate::aggregate::SearchResultsCommon;
use crate::compiler::{compile, CompileMode};
use crate::error::{AppError, Result};
use crate::index::{IndexError, IndexSearchOutcome, IndexSearchRequest};
use crate::models::{FileMatch, PatternInfo};
use crate::partition::{partition, IndexDirective, PartitionRequest, RepoFilter};
use crate::unindexed::{flatten_file_matches, UnindexedOutcome, UnindexedSearchRequest};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Search file contents and paths, or symbols, across every repository in scope.
///
/// The index and the unindexed backend run concurrently; their matches are
/// grouped per repository and flattened fairly down to the file match limit.
/// Symbol search only covers indexed repositories with symbol data.
pub async fn search_files_in_repos(
    backends: &SearchBackends,
    args: &SearchArgs,
    info: &PatternInfo,
    mode: CompileMode,
    cancel: &CancellationToken,
) -> Result<(Vec<FileMatch>, SearchResultsCommon)> {
    let compiled = compile(info, mode)?;

    let filter = match mode {
        CompileMode::Symbol => RepoFilter::HasSymbols,
        CompileMode::Text => RepoFilter::All,
    };
    let parts = partition(
        backends.index.service().as_ref(),
        &PartitionRequest {
            repos: &args.repos,
            directive: args.directive,
            filter,
        },
        backends.index.config().probe_timeout(),
    )
    .await?;
    if info.is_structural() {
        parts.require_head_only()?;
    }

    let mut common = SearchResultsCommon::new();
    common.repos.extend(args.repos.iter().map(|r| r.repo.clone()));
    common.index_unavailable = parts.index_unavailable;
    if parts.index_unavailable {
        warn!("Index unavailable, searching every repository without it");
    }

    debug!(
        indexed = parts.indexed.len(),
        unindexed = parts.unindexed.len(),
        mode = ?mode,
        "Partitioned repositories"
    );

    let global = args.global && args.directive != IndexDirective::No && !parts.index_unavailable;
    let index_request = IndexSearchRequest {
        pattern: info,
        query: &compiled.index_query,
        mode,
        indexed: &parts.indexed,
        global_repos: global.then_some(args.repos.as_slice()),
        num_repos: args.repos.len(),
        deadline: args.deadline,
    };
    let index_search = async {
        if args.directive == IndexDirective::No || parts.index_unavailable {
            return Ok(IndexSearchOutcome::default());
        }
        backends.index.search(&index_request).await
    };

    let unindexed_request = UnindexedSearchRequest {
        info,
        pattern: &compiled.backend,
        repos: &parts.unindexed,
        deadline: args.deadline,
        use_full_deadline: args.use_full_deadline,
    };
    let unindexed_search = async {
        if mode == CompileMode::Symbol || parts.unindexed.is_empty() {
            return Ok(UnindexedOutcome::default());
        }
        backends.unindexed.search(&unindexed_request, cancel).await
    };

    let (indexed, unindexed) = tokio::join!(index_search, unindexed_search);

    let mut groups = Vec::new();
    match indexed {
        Ok(outcome) => {
            common.update(&outcome.common);
            groups.extend(group_by_repo(outcome.matches));
        }
        Err(IndexError::NoResultsInTimeout) | Err(IndexError::Timeout) => {
            warn!(repos = parts.indexed.len(), "Index search timed out");
            for repo in parts.indexed.iter() {
                common.searched.insert(repo.repo.clone());
                common.indexed.insert(repo.repo.clone());
                common.timedout.insert(repo.repo.clone());
            }
        }
        Err(e) if args.directive == IndexDirective::Only => {
            return Err(AppError::IndexUnavailable(e.to_string()));
        }
        Err(e) => {
            warn!(error = %e, "Index search failed");
            common.index_unavailable = true;
        }
    }

    let unindexed = unindexed?;
    common.update(&unindexed.common);
    groups.extend(unindexed.groups);

    let total: usize = groups.iter().map(Vec::len).sum();
    if total > info.file_match_limit {
        common.limit_hit = true;
    }
    let matches = flatten_file_matches(groups, info.file_match_limit);
    common.result_count = matches.iter().map(FileMatch::result_count).sum();

    Ok((matches, common))
}

/// Index matches arrive as one batch; split them so the flattener treats
/// each repository separately
fn group_by_repo(matches: Vec<FileMatch>) -> Vec<Vec<FileMatch>> {
    let mut by_repo: BTreeMap<String, Vec<FileMatch>> = BTreeMap::new();
    for m in matches {
        by_repo.entry(m.repo.name.clone()).or_default().push(m);
    }
    by_repo.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Repo;

    #[test]
    fn test_group_by_repo() {
        let matches = vec![
            FileMatch::new(Repo::new(1, "b"), "c", "x"),
            FileMatch::new(Repo::new(2, "a"), "c", "y"),
            FileMatch::new(Repo::new(1, "b"), "c", "z"),
        ];
        let groups = group_by_repo(matches);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0][0].repo.name, "a");
        assert_eq!(groups[1].len(), 2);
    }
}
