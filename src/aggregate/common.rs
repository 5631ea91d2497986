//! Cross-cutting search statistics

use crate::models::Repo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Repositories left out of the search scope, reported for user-facing filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedRepos {
    pub forks: usize,
    pub archived: usize,
}

/// Statistics gathered alongside results.
///
/// Every contributor builds its own instance privately and merges it once
/// with [`SearchResultsCommon::update`]. The merge is commutative and
/// associative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultsCommon {
    /// Some result set was truncated by a count or time budget
    pub limit_hit: bool,

    /// Repositories in scope
    pub repos: BTreeSet<Repo>,
    pub searched: BTreeSet<Repo>,

    /// Searched through the index service
    pub indexed: BTreeSet<Repo>,
    pub cloning: BTreeSet<Repo>,
    pub missing: BTreeSet<Repo>,
    pub timedout: BTreeSet<Repo>,

    /// Repository names whose result set is known to be incomplete
    pub partial: BTreeSet<String>,

    pub excluded: ExcludedRepos,

    pub result_count: usize,
    pub max_results_count: usize,

    /// The index should have been used but could not be reached
    pub index_unavailable: bool,
}

impl SearchResultsCommon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `other` into `self`
    pub fn update(&mut self, other: &SearchResultsCommon) {
        self.limit_hit |= other.limit_hit;
        self.index_unavailable |= other.index_unavailable;

        self.repos.extend(other.repos.iter().cloned());
        self.searched.extend(other.searched.iter().cloned());
        self.indexed.extend(other.indexed.iter().cloned());
        self.cloning.extend(other.cloning.iter().cloned());
        self.missing.extend(other.missing.iter().cloned());
        self.timedout.extend(other.timedout.iter().cloned());
        self.partial.extend(other.partial.iter().cloned());

        self.excluded.forks += other.excluded.forks;
        self.excluded.archived += other.excluded.archived;

        self.result_count += other.result_count;
        self.max_results_count = self.max_results_count.max(other.max_results_count);
    }

    /// Whether results were truncated, explicitly or by exceeding the requested count
    pub fn limit_hit(&self) -> bool {
        self.limit_hit || (self.max_results_count > 0 && self.result_count > self.max_results_count)
    }

    /// Record a repository as partially searched
    pub fn mark_partial(&mut self, repo: &Repo) {
        self.limit_hit = true;
        self.partial.insert(repo.name.clone());
    }
}
