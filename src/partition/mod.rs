//! Repository partitioning
//!
//! Splits the resolved repository revisions into those the index can serve
//! and those that must be searched by the unindexed backend.

use crate::error::AppError;
use crate::index::{IndexService, IndexedRepository};
use crate::models::{RepositoryRevisions, RevisionSpecifier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::{debug, warn};

/// The `index:` query directive
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IndexDirective {
    /// Use the index where possible
    #[default]
    Yes,
    /// Search only what the index covers; failing to use it is an error
    Only,
    /// Never consult the index
    No,
}

/// Which indexed repositories are eligible
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RepoFilter {
    #[default]
    All,
    /// Only repositories the index has symbol data for
    HasSymbols,
}

impl RepoFilter {
    fn accepts(&self, repo: &IndexedRepository) -> bool {
        match self {
            RepoFilter::All => true,
            RepoFilter::HasSymbols => repo.has_symbols,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    #[error("repository {0} appears more than once in the search scope")]
    DuplicateRepository(String),

    #[error("index:only failed since indexed search is not enabled")]
    IndexOnlyDisabled,

    #[error("index:only cannot be used with ref-glob revision filters")]
    IndexOnlyRefGlobs,

    #[error("index:only failed since the index is unavailable: {0}")]
    IndexOnlyUnavailable(String),

    #[error("structural search only supports searching the default branch")]
    NotHeadOnly,
}

impl From<PartitionError> for AppError {
    fn from(err: PartitionError) -> Self {
        match err {
            PartitionError::DuplicateRepository(_) => AppError::InvalidInput(err.to_string()),
            PartitionError::IndexOnlyUnavailable(_) | PartitionError::IndexOnlyDisabled => {
                AppError::IndexUnavailable(err.to_string())
            }
            PartitionError::IndexOnlyRefGlobs | PartitionError::NotHeadOnly => {
                AppError::BadRequest(err.to_string())
            }
        }
    }
}

/// A requested revision paired with the index branch that serves it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRevision {
    pub revision: RevisionSpecifier,
    pub branch: String,
}

/// A repository together with its indexed revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRepo {
    pub repo: crate::models::Repo,
    pub revisions: Vec<IndexedRevision>,
}

/// The indexed side of a partition, keyed by repository name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRepoRevs {
    repos: BTreeMap<String, IndexedRepo>,
    head_only: bool,
}

impl Default for IndexedRepoRevs {
    fn default() -> Self {
        Self {
            repos: BTreeMap::new(),
            head_only: true,
        }
    }
}

impl IndexedRepoRevs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the revisions of `reporev` against the branches the index has
    /// for it. Returns the revisions the index cannot serve.
    pub fn add(
        &mut self,
        reporev: &RepositoryRevisions,
        indexed: &IndexedRepository,
    ) -> Vec<RevisionSpecifier> {
        let revs = if reporev.revs.is_empty() {
            vec![RevisionSpecifier::head()]
        } else {
            reporev.revs.clone()
        };

        if indexed.branches.is_empty() {
            return revs;
        }

        let mut matched = Vec::new();
        let mut unindexed = Vec::new();
        for rev in revs {
            if !rev.is_explicit() {
                unindexed.push(rev);
                continue;
            }
            match find_branch(indexed, &rev.rev_spec) {
                Some(position) => {
                    if position != 0 {
                        self.head_only = false;
                    }
                    matched.push(IndexedRevision {
                        revision: rev,
                        branch: indexed.branches[position].name.clone(),
                    });
                }
                None => unindexed.push(rev),
            }
        }

        if !matched.is_empty() {
            self.repos.insert(
                reporev.repo.name.clone(),
                IndexedRepo {
                    repo: reporev.repo.clone(),
                    revisions: matched,
                },
            );
        }
        unindexed
    }

    /// Whether every indexed revision is the default branch
    pub fn head_only(&self) -> bool {
        self.head_only
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&IndexedRepo> {
        self.repos.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedRepo> {
        self.repos.values()
    }

    /// Branch restriction for the index query
    pub fn repo_branches(&self) -> BTreeMap<String, Vec<String>> {
        self.repos
            .iter()
            .map(|(name, repo)| {
                let mut branches: Vec<String> =
                    repo.revisions.iter().map(|r| r.branch.clone()).collect();
                branches.dedup();
                (name.clone(), branches)
            })
            .collect()
    }

    /// Input revisions a file found on `branches` answers
    pub fn input_revs(&self, repo: &str, branches: &[String]) -> Vec<String> {
        let Some(indexed) = self.repos.get(repo) else {
            return Vec::new();
        };
        let mut revs = Vec::new();
        for branch in branches {
            for pair in &indexed.revisions {
                if &pair.branch == branch && !revs.contains(&pair.revision.rev_spec) {
                    revs.push(pair.revision.rev_spec.clone());
                }
            }
        }
        revs
    }
}

fn find_branch(indexed: &IndexedRepository, rev: &str) -> Option<usize> {
    if rev.is_empty() || rev == "HEAD" {
        return Some(0);
    }
    if let Some(position) = indexed.branches.iter().position(|b| b.name == rev) {
        return Some(position);
    }
    // Abbreviated commit SHA
    if rev.len() >= 4 {
        return indexed
            .branches
            .iter()
            .position(|b| b.version.starts_with(rev));
    }
    None
}

/// Result of partitioning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub indexed: IndexedRepoRevs,
    pub unindexed: Vec<RepositoryRevisions>,

    /// The index was supposed to be used but could not be reached
    pub index_unavailable: bool,
}

impl Partition {
    fn all_unindexed(repos: &[RepositoryRevisions]) -> Self {
        Self {
            indexed: IndexedRepoRevs::new(),
            unindexed: repos.to_vec(),
            index_unavailable: false,
        }
    }

    /// Structural search can only run on the default branch
    pub fn require_head_only(&self) -> Result<(), PartitionError> {
        if self.indexed.head_only() {
            Ok(())
        } else {
            Err(PartitionError::NotHeadOnly)
        }
    }
}

/// Input to [`partition`]
#[derive(Debug, Clone, Copy)]
pub struct PartitionRequest<'a> {
    pub repos: &'a [RepositoryRevisions],
    pub directive: IndexDirective,
    pub filter: RepoFilter,
}

/// Split `request.repos` into indexed and unindexed revisions
pub async fn partition(
    index: &dyn IndexService,
    request: &PartitionRequest<'_>,
    probe_timeout: Duration,
) -> Result<Partition, PartitionError> {
    let mut seen = HashSet::with_capacity(request.repos.len());
    for reporev in request.repos {
        if !seen.insert(reporev.repo.name.as_str()) {
            return Err(PartitionError::DuplicateRepository(reporev.repo.name.clone()));
        }
    }

    let only = request.directive == IndexDirective::Only;

    if !index.enabled() {
        if only {
            return Err(PartitionError::IndexOnlyDisabled);
        }
        return Ok(Partition::all_unindexed(request.repos));
    }

    if request.repos.iter().any(RepositoryRevisions::has_ref_globs) {
        if only {
            return Err(PartitionError::IndexOnlyRefGlobs);
        }
        return Ok(Partition::all_unindexed(request.repos));
    }

    if request.directive == IndexDirective::No {
        return Ok(Partition::all_unindexed(request.repos));
    }

    let listed = match tokio::time::timeout(probe_timeout, index.list()).await {
        Ok(Ok(listed)) => listed,
        Ok(Err(e)) => return unavailable(request, only, e.to_string()),
        Err(_) => {
            return unavailable(
                request,
                only,
                format!("listing timed out after {}ms", probe_timeout.as_millis()),
            )
        }
    };
    let listed: HashMap<&str, &IndexedRepository> =
        listed.iter().map(|repo| (repo.name.as_str(), repo)).collect();

    let mut result = Partition::default();
    for reporev in request.repos {
        let Some(indexed) = listed
            .get(reporev.repo.name.as_str())
            .filter(|repo| request.filter.accepts(repo))
        else {
            result.unindexed.push(reporev.clone());
            continue;
        };

        let remainder = result.indexed.add(reporev, indexed);
        if result.indexed.get(&reporev.repo.name).is_none() {
            result.unindexed.push(reporev.clone());
        } else if !remainder.is_empty() {
            result
                .unindexed
                .push(RepositoryRevisions::new(reporev.repo.clone(), remainder));
        }
    }

    if only {
        result.unindexed.clear();
    }

    debug!(
        indexed = result.indexed.len(),
        unindexed = result.unindexed.len(),
        head_only = result.indexed.head_only(),
        "Partitioned repositories"
    );
    Ok(result)
}

fn unavailable(
    request: &PartitionRequest<'_>,
    only: bool,
    reason: String,
) -> Result<Partition, PartitionError> {
    if only {
        return Err(PartitionError::IndexOnlyUnavailable(reason));
    }
    warn!(reason = %reason, "Index unavailable, falling back to unindexed search");
    let mut result = Partition::all_unindexed(request.repos);
    result.index_unavailable = true;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexBranch, InMemoryIndex};
    use crate::models::Repo;

    fn indexed(name: &str, branches: &[(&str, &str)]) -> IndexedRepository {
        IndexedRepository {
            name: name.to_string(),
            branches: branches
                .iter()
                .map(|(n, v)| IndexBranch {
                    name: n.to_string(),
                    version: v.to_string(),
                })
                .collect(),
            has_symbols: false,
        }
    }

    fn revs(id: i32, name: &str, revs: &[&str]) -> RepositoryRevisions {
        RepositoryRevisions::new(
            Repo::new(id, name),
            revs.iter().map(|r| RevisionSpecifier::explicit(*r)).collect(),
        )
    }

    fn request(repos: &[RepositoryRevisions]) -> PartitionRequest<'_> {
        PartitionRequest {
            repos,
            directive: IndexDirective::Yes,
            filter: RepoFilter::All,
        }
    }

    #[test]
    fn test_add_maps_head_branch_and_sha() {
        let repo = indexed("r", &[("HEAD", "abcdef0123"), ("dev", "99887766")]);
        let mut revs_map = IndexedRepoRevs::new();

        let remainder = revs_map.add(&revs(1, "r", &["", "dev", "9988", "nope"]), &repo);
        assert_eq!(remainder, vec![RevisionSpecifier::explicit("nope")]);

        let entry = revs_map.get("r").unwrap();
        let branches: Vec<&str> = entry.revisions.iter().map(|r| r.branch.as_str()).collect();
        assert_eq!(branches, vec!["HEAD", "dev", "dev"]);
        assert_eq!(entry.revisions[2].revision.rev_spec, "9988");
        assert!(!revs_map.head_only());
    }

    #[test]
    fn test_add_short_sha_is_not_matched() {
        let repo = indexed("r", &[("HEAD", "abcdef")]);
        let mut revs_map = IndexedRepoRevs::new();
        let remainder = revs_map.add(&revs(1, "r", &["abc"]), &repo);
        assert_eq!(remainder.len(), 1);
        assert!(revs_map.is_empty());
        assert!(revs_map.head_only());
    }

    #[test]
    fn test_input_revs() {
        let repo = indexed("r", &[("HEAD", "a1"), ("dev", "b2")]);
        let mut revs_map = IndexedRepoRevs::new();
        revs_map.add(&revs(1, "r", &["HEAD", "dev"]), &repo);
        assert_eq!(
            revs_map.input_revs("r", &["dev".to_string(), "HEAD".to_string()]),
            vec!["dev".to_string(), "HEAD".to_string()]
        );
        assert!(revs_map.input_revs("unknown", &["HEAD".to_string()]).is_empty());
    }

    #[tokio::test]
    async fn test_partition_splits_by_index_membership() {
        let index = InMemoryIndex::new();
        index.add_repository(indexed("a", &[("HEAD", "1111")]), Vec::new());

        let repos = vec![revs(1, "a", &[""]), revs(2, "b", &[""])];
        let result = partition(&index, &request(&repos), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(result.indexed.len(), 1);
        assert!(result.indexed.get("a").is_some());
        assert_eq!(result.unindexed, vec![repos[1].clone()]);
        assert!(!result.index_unavailable);
    }

    #[tokio::test]
    async fn test_partition_rejects_duplicates() {
        let index = InMemoryIndex::new();
        let repos = vec![revs(1, "a", &[""]), revs(1, "a", &["dev"])];
        let err = partition(&index, &request(&repos), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, PartitionError::DuplicateRepository("a".to_string()));
    }

    #[tokio::test]
    async fn test_ref_globs_and_directives() {
        let index = InMemoryIndex::new();
        index.add_repository(indexed("a", &[("HEAD", "1111")]), Vec::new());

        let globbed = vec![RepositoryRevisions::new(
            Repo::new(1, "a"),
            vec![RevisionSpecifier::ref_glob("refs/heads/*")],
        )];
        let result = partition(&index, &request(&globbed), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.indexed.is_empty());
        assert_eq!(result.unindexed.len(), 1);

        let mut only = request(&globbed);
        only.directive = IndexDirective::Only;
        assert_eq!(
            partition(&index, &only, Duration::from_secs(1)).await.unwrap_err(),
            PartitionError::IndexOnlyRefGlobs
        );

        let repos = vec![revs(1, "a", &[""])];
        let mut no = request(&repos);
        no.directive = IndexDirective::No;
        let result = partition(&index, &no, Duration::from_secs(1)).await.unwrap();
        assert!(result.indexed.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_index_falls_back() {
        let index = InMemoryIndex::new();
        index.add_repository(indexed("a", &[("HEAD", "1111")]), Vec::new());
        index.set_available(false);

        let repos = vec![revs(1, "a", &[""])];
        let result = partition(&index, &request(&repos), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.index_unavailable);
        assert_eq!(result.unindexed.len(), 1);

        let mut only = request(&repos);
        only.directive = IndexDirective::Only;
        assert!(matches!(
            partition(&index, &only, Duration::from_secs(1)).await,
            Err(PartitionError::IndexOnlyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_symbol_filter() {
        let index = InMemoryIndex::new();
        index.add_repository(indexed("a", &[("HEAD", "1111")]), Vec::new());
        let repos = vec![revs(1, "a", &[""])];
        let mut req = request(&repos);
        req.filter = RepoFilter::HasSymbols;
        let result = partition(&index, &req, Duration::from_secs(1)).await.unwrap();
        assert!(result.indexed.is_empty());
        assert_eq!(result.unindexed.len(), 1);
    }

    #[test]
    fn test_directive_parsing() {
        use std::str::FromStr;
        assert_eq!(IndexDirective::from_str("only").unwrap(), IndexDirective::Only);
        assert_eq!(IndexDirective::default(), IndexDirective::Yes);
    }
}
