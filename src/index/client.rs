//! Index service interface

use crate::compiler::IndexQuery;
use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A branch the index has built, with the commit it was built at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBranch {
    pub name: String,
    pub version: String,
}

/// A repository known to the index. The first branch is the default ("HEAD") branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRepository {
    pub name: String,
    pub branches: Vec<IndexBranch>,

    #[serde(default)]
    pub has_symbols: bool,
}

/// Per-request caps and budgets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSearchOptions {
    pub shard_max_match_count: usize,
    pub total_max_match_count: usize,
    pub shard_max_important_match: usize,
    pub total_max_important_match: usize,
    pub max_doc_display_count: usize,
    pub max_wall_time: Duration,
}

/// Symbol annotation on a fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSymbol {
    pub sym: String,
    pub kind: String,

    #[serde(default)]
    pub parent: Option<String>,
}

/// One match inside a line. Offsets are in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFragment {
    pub line_offset: usize,
    pub match_length: usize,

    #[serde(default)]
    pub symbol: Option<IndexSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexLineMatch {
    pub line: String,

    /// 1-based
    pub line_number: u32,

    /// The match is on the file name, not its content
    #[serde(default)]
    pub file_name: bool,

    pub fragments: Vec<IndexFragment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFileMatch {
    pub repository: String,
    pub file_name: String,

    /// Branches whose tree contains this file version
    pub branches: Vec<String>,

    /// Commit of the matched content
    pub version: String,
    pub line_matches: Vec<IndexLineMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSearchStats {
    pub match_count: usize,
    pub file_count: usize,
    pub files_skipped: usize,
    pub shards_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSearchResult {
    pub files: Vec<IndexFileMatch>,
    pub stats: IndexSearchStats,
}

/// Errors from the index service or the index executor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("index service unavailable: {0}")]
    Unavailable(String),

    #[error("index search failed: {0}")]
    Failed(String),

    #[error("index search timed out")]
    Timeout,

    /// Zero matches and the time budget was used up: absence of results is not conclusive
    #[error("no results found in the index before the deadline")]
    NoResultsInTimeout,
}

impl IndexError {
    /// Whether the error means "we ran out of time" rather than "something broke"
    pub fn is_timeout(&self) -> bool {
        matches!(self, IndexError::Timeout | IndexError::NoResultsInTimeout)
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Unavailable(msg) => AppError::IndexUnavailable(msg),
            IndexError::Timeout | IndexError::NoResultsInTimeout => {
                AppError::Timeout(err.to_string())
            }
            IndexError::Failed(msg) => AppError::service("index", msg),
        }
    }
}

/// The pre-built index
#[async_trait]
pub trait IndexService: Send + Sync {
    /// Whether the index is configured at all
    fn enabled(&self) -> bool;

    /// All repositories and branches the index covers
    async fn list(&self) -> Result<Vec<IndexedRepository>, IndexError>;

    /// Run one query
    async fn search(
        &self,
        query: &IndexQuery,
        options: &IndexSearchOptions,
    ) -> Result<IndexSearchResult, IndexError>;
}
