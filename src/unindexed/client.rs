//! Backend search service and revision resolution interfaces

use crate::compiler::BackendPattern;
use crate::error::AppError;
use crate::models::{LineMatch, Repo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One repository search sent to a backend instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSearchRequest {
    pub repo: String,
    pub commit: String,
    pub pattern: BackendPattern,
    pub fetch_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendFileMatch {
    pub path: String,

    /// Offsets already in Unicode code points
    #[serde(default)]
    pub line_matches: Vec<LineMatch>,

    #[serde(default)]
    pub limit_hit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSearchResponse {
    pub matches: Vec<BackendFileMatch>,

    /// The backend stopped at the file match limit
    #[serde(default)]
    pub limit_hit: bool,

    /// The backend stopped because its deadline passed
    #[serde(default)]
    pub deadline_hit: bool,
}

/// Per-repository failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoSearchError {
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("repository is being cloned: {0}")]
    CloneInProgress(String),

    #[error("revision {rev:?} not found in {repo}")]
    RevisionNotFound { repo: String, rev: String },

    #[error("repository {repo} has {count} revisions but only one can be searched at a time")]
    MultipleRevisionsNotSupported { repo: String, count: usize },

    #[error("revision {rev:?} of {repo} must be expanded to commits before an unindexed search")]
    UnexpandedRevision { repo: String, rev: String },

    #[error("search timed out")]
    Timeout,

    #[error("backend instance {endpoint} unavailable: {message}")]
    Unavailable { endpoint: String, message: String },

    #[error("no backend instances available")]
    NoEndpoints,

    #[error("search cancelled")]
    Cancelled,

    #[error("backend search failed: {0}")]
    Backend(String),
}

impl RepoSearchError {
    /// Worth retrying on another instance
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepoSearchError::Unavailable { .. })
    }

    /// Classified as a timeout rather than a failure
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            RepoSearchError::Timeout | RepoSearchError::Unavailable { .. }
        )
    }
}

impl From<RepoSearchError> for AppError {
    fn from(err: RepoSearchError) -> Self {
        match err {
            RepoSearchError::MultipleRevisionsNotSupported { .. }
            | RepoSearchError::UnexpandedRevision { .. } => AppError::BadRequest(err.to_string()),
            RepoSearchError::RevisionNotFound { .. } => AppError::InvalidInput(err.to_string()),
            RepoSearchError::Timeout => AppError::Timeout(err.to_string()),
            RepoSearchError::Cancelled => AppError::Cancelled,
            _ => AppError::service("backend", err.to_string()),
        }
    }
}

/// On-the-fly search over one repository at one commit
#[async_trait]
pub trait BackendSearcher: Send + Sync {
    /// Currently available instances
    fn endpoints(&self) -> Vec<String>;

    async fn search(
        &self,
        endpoint: &str,
        request: &BackendSearchRequest,
    ) -> Result<BackendSearchResponse, RepoSearchError>;
}

/// Resolves a revision specifier to a commit
#[async_trait]
pub trait RevisionResolver: Send + Sync {
    async fn resolve(&self, repo: &Repo, rev: &str) -> Result<String, RepoSearchError>;
}
