use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::repo::Repo;

/// Kinds of results a leaf evaluation can produce
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResultType {
    Repo,
    File,
    Path,
    Symbol,
    Diff,
    Commit,
}

impl ResultType {
    /// Result types searched when the query does not name any
    pub fn defaults() -> Vec<ResultType> {
        vec![ResultType::File, ResultType::Path, ResultType::Repo]
    }
}

/// One matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatch {
    pub preview: String,

    /// 0-based
    pub line_number: u32,

    /// (offset, length) pairs in Unicode code points
    pub offset_and_lengths: Vec<(u32, u32)>,

    #[serde(default)]
    pub limit_hit: bool,
}

/// A symbol definition matched by a symbol search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub name: String,
    pub kind: String,

    #[serde(default)]
    pub parent: Option<String>,

    /// 0-based line of the definition
    pub line: u32,
}

/// All matches in one file at one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatch {
    pub repo: Repo,

    /// Resolved commit the file was read at
    pub commit: String,

    /// Revision as the user asked for it, if any
    #[serde(default)]
    pub input_rev: Option<String>,

    pub path: String,

    #[serde(default)]
    pub line_matches: Vec<LineMatch>,

    #[serde(default)]
    pub symbols: Vec<SymbolMatch>,

    #[serde(default)]
    pub limit_hit: bool,
}

impl FileMatch {
    pub fn new(repo: Repo, commit: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo,
            commit: commit.into(),
            input_rev: None,
            path: path.into(),
            line_matches: Vec::new(),
            symbols: Vec::new(),
            limit_hit: false,
        }
    }

    /// Sortable identity of the form `repo?rev#path`
    pub fn uri(&self) -> String {
        match self.input_rev.as_deref() {
            Some(rev) if !rev.is_empty() => format!("{}?{}#{}", self.repo.name, rev, self.path),
            _ => format!("{}#{}", self.repo.name, self.path),
        }
    }

    /// Number of matches this file contributes, at least one
    pub fn result_count(&self) -> usize {
        let count = if !self.symbols.is_empty() {
            self.symbols.len()
        } else {
            self.line_matches
                .iter()
                .map(|line| line.offset_and_lengths.len())
                .sum()
        };
        count.max(1)
    }

    /// Fold another leaf's matches for the same file into this one
    pub fn append_matches(&mut self, other: &FileMatch) {
        self.line_matches.extend(other.line_matches.iter().cloned());
        self.symbols.extend(other.symbols.iter().cloned());
        self.limit_hit |= other.limit_hit;
    }
}

/// A repository whose name matched the pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMatch {
    pub repo: Repo,

    #[serde(default)]
    pub rev: Option<String>,
}

/// A commit or diff hit returned by the commit search collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMatch {
    pub repo: Repo,
    pub commit: String,
    pub message: String,

    #[serde(default)]
    pub diff_preview: Option<String>,
}

/// Polymorphic search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchResult {
    Repository(RepoMatch),
    File(FileMatch),
    Commit(CommitMatch),
}

impl SearchResult {
    pub fn repo(&self) -> &Repo {
        match self {
            SearchResult::Repository(m) => &m.repo,
            SearchResult::File(m) => &m.repo,
            SearchResult::Commit(m) => &m.repo,
        }
    }

    pub fn uri(&self) -> String {
        match self {
            SearchResult::Repository(m) => match m.rev.as_deref() {
                Some(rev) if !rev.is_empty() => format!("{}?{}", m.repo.name, rev),
                _ => m.repo.name.clone(),
            },
            SearchResult::File(m) => m.uri(),
            SearchResult::Commit(m) => format!("{}?{}", m.repo.name, m.commit),
        }
    }

    pub fn result_count(&self) -> usize {
        match self {
            SearchResult::File(m) => m.result_count(),
            SearchResult::Repository(_) | SearchResult::Commit(_) => 1,
        }
    }

    pub fn as_file_match(&self) -> Option<&FileMatch> {
        match self {
            SearchResult::File(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_file_match_mut(&mut self) -> Option<&mut FileMatch> {
        match self {
            SearchResult::File(m) => Some(m),
            _ => None,
        }
    }
}

impl From<FileMatch> for SearchResult {
    fn from(m: FileMatch) -> Self {
        SearchResult::File(m)
    }
}

/// Deterministic order: repository name, then URI
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by_cached_key(|result| (result.repo().name.clone(), result.uri()));
}
