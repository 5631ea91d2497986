//! In-memory backend search service used by the CLI and tests

use super::client::{
    BackendFileMatch, BackendSearchRequest, BackendSearchResponse, BackendSearcher,
    RepoSearchError, RevisionResolver,
};
use crate::compiler::BackendPattern;
use crate::models::{LineMatch, Repo};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A file at the repository's searchable commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDocument {
    pub path: String,
    pub content: String,
}

/// A repository as the backend sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRepository {
    pub name: String,

    /// Commit the default branch points at
    pub default_commit: String,

    /// Named revisions (branches, tags) and the commits they resolve to
    #[serde(default)]
    pub revisions: BTreeMap<String, String>,

    #[serde(default)]
    pub files: Vec<BackendDocument>,

    /// Clone still in progress: every request fails
    #[serde(default)]
    pub cloning: bool,
}

/// [`BackendSearcher`] and [`RevisionResolver`] over repositories held in memory
pub struct InMemoryBackend {
    repos: DashMap<String, BackendRepository>,
    endpoints: Mutex<Vec<String>>,
    down: DashSet<String>,
    latency: DashMap<String, Duration>,
    deadline_hits: DashSet<String>,
    failures: DashMap<String, String>,
    requests: Mutex<Vec<(String, BackendSearchRequest)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            repos: DashMap::new(),
            endpoints: Mutex::new(endpoints),
            down: DashSet::new(),
            latency: DashMap::new(),
            deadline_hits: DashSet::new(),
            failures: DashMap::new(),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn add_repository(&self, repo: BackendRepository) {
        tracing::debug!(repo = %repo.name, files = repo.files.len(), "Repository available to backend");
        self.repos.insert(repo.name.clone(), repo);
    }

    pub fn set_endpoints(&self, endpoints: Vec<String>) {
        *self.endpoints.lock() = endpoints;
    }

    /// Requests to a down instance fail as unavailable
    pub fn set_endpoint_down(&self, endpoint: &str, down: bool) {
        if down {
            self.down.insert(endpoint.to_string());
        } else {
            self.down.remove(endpoint);
        }
    }

    /// Searches of `repo` take this long; past the fetch timeout the backend gives up
    pub fn set_latency(&self, repo: &str, latency: Duration) {
        self.latency.insert(repo.to_string(), latency);
    }

    /// Searches of `repo` report a deadline hit with no matches
    pub fn set_deadline_hit(&self, repo: &str) {
        self.deadline_hits.insert(repo.to_string());
    }

    /// Searches of `repo` fail with a non-retryable error
    pub fn set_failure(&self, repo: &str, message: &str) {
        self.failures.insert(repo.to_string(), message.to_string());
    }

    /// `(endpoint, repo)` for every search served so far
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .iter()
            .map(|(endpoint, request)| (endpoint.clone(), request.repo.clone()))
            .collect()
    }

    /// Every request served so far, in arrival order
    pub fn search_requests(&self) -> Vec<BackendSearchRequest> {
        self.requests
            .lock()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Highest number of concurrent searches observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn serve(&self, request: &BackendSearchRequest) -> Result<BackendSearchResponse, RepoSearchError> {
        let repo = self
            .repos
            .get(&request.repo)
            .map(|r| r.clone())
            .ok_or_else(|| RepoSearchError::RepoNotFound(request.repo.clone()))?;
        if repo.cloning {
            return Err(RepoSearchError::CloneInProgress(repo.name));
        }
        if let Some(message) = self.failures.get(&repo.name) {
            return Err(RepoSearchError::Backend(message.clone()));
        }

        let latency = self.latency.get(&repo.name).map(|l| *l).unwrap_or_default();
        if self.deadline_hits.contains(&repo.name) || latency > request.fetch_timeout {
            return Ok(BackendSearchResponse {
                deadline_hit: true,
                ..Default::default()
            });
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        search_files(&request.pattern, &repo.files)
    }
}

#[async_trait]
impl BackendSearcher for InMemoryBackend {
    fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().clone()
    }

    async fn search(
        &self,
        endpoint: &str,
        request: &BackendSearchRequest,
    ) -> Result<BackendSearchResponse, RepoSearchError> {
        self.requests
            .lock()
            .push((endpoint.to_string(), request.clone()));
        if self.down.contains(endpoint) {
            return Err(RepoSearchError::Unavailable {
                endpoint: endpoint.to_string(),
                message: "connection refused".to_string(),
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.serve(request).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl RevisionResolver for InMemoryBackend {
    async fn resolve(&self, repo: &Repo, rev: &str) -> Result<String, RepoSearchError> {
        let stored = self
            .repos
            .get(&repo.name)
            .ok_or_else(|| RepoSearchError::RepoNotFound(repo.name.clone()))?;
        if stored.cloning {
            return Err(RepoSearchError::CloneInProgress(repo.name.clone()));
        }
        if rev.is_empty() || rev == "HEAD" {
            if stored.default_commit.is_empty() {
                return Err(RepoSearchError::RevisionNotFound {
                    repo: repo.name.clone(),
                    rev: rev.to_string(),
                });
            }
            return Ok(stored.default_commit.clone());
        }
        if let Some(commit) = stored.revisions.get(rev) {
            return Ok(commit.clone());
        }
        // Abbreviated commit hashes
        let known = std::iter::once(&stored.default_commit).chain(stored.revisions.values());
        for commit in known {
            if rev.len() >= 4 && commit.starts_with(rev) {
                return Ok(commit.clone());
            }
        }
        Err(RepoSearchError::RevisionNotFound {
            repo: repo.name.clone(),
            rev: rev.to_string(),
        })
    }
}

fn build_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, RepoSearchError> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| RepoSearchError::Backend(e.to_string()))
}

/// Structural patterns are matched literally
fn search_files(
    pattern: &BackendPattern,
    files: &[BackendDocument],
) -> Result<BackendSearchResponse, RepoSearchError> {
    let matcher = if pattern.pattern.is_empty() {
        None
    } else if pattern.is_regexp {
        Some(build_regex(&pattern.pattern, pattern.is_case_sensitive)?)
    } else {
        Some(build_regex(&regex::escape(&pattern.pattern), pattern.is_case_sensitive)?)
    };
    let path_case = pattern.path_patterns_are_case_sensitive;
    let includes = pattern
        .include_patterns
        .iter()
        .map(|p| build_regex(p, path_case))
        .collect::<Result<Vec<_>, _>>()?;
    let exclude = pattern
        .exclude_pattern
        .as_deref()
        .map(|p| build_regex(p, path_case))
        .transpose()?;

    let mut response = BackendSearchResponse::default();
    let mut sorted: Vec<&BackendDocument> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    for doc in sorted {
        if !includes.iter().all(|re| re.is_match(&doc.path)) {
            continue;
        }
        if exclude.as_ref().is_some_and(|re| re.is_match(&doc.path)) {
            continue;
        }

        let file_match = match &matcher {
            None => Some(BackendFileMatch {
                path: doc.path.clone(),
                line_matches: Vec::new(),
                limit_hit: false,
            }),
            Some(re) => {
                let line_matches = if pattern.pattern_matches_content {
                    content_matches(re, &doc.content)
                } else {
                    Vec::new()
                };
                let path_hit = pattern.pattern_matches_path && re.is_match(&doc.path);
                let matched = !line_matches.is_empty() || path_hit;
                if pattern.is_negated {
                    (!matched).then(|| BackendFileMatch {
                        path: doc.path.clone(),
                        line_matches: Vec::new(),
                        limit_hit: false,
                    })
                } else {
                    matched.then(|| BackendFileMatch {
                        path: doc.path.clone(),
                        line_matches,
                        limit_hit: false,
                    })
                }
            }
        };

        if let Some(file_match) = file_match {
            if response.matches.len() == pattern.file_match_limit {
                response.limit_hit = true;
                break;
            }
            response.matches.push(file_match);
        }
    }
    Ok(response)
}

fn content_matches(re: &Regex, content: &str) -> Vec<LineMatch> {
    content
        .split('\n')
        .enumerate()
        .filter_map(|(number, line)| {
            let ranges: Vec<(u32, u32)> = re
                .find_iter(line)
                .filter(|m| !m.is_empty())
                .map(|m| {
                    let start = line[..m.start()].chars().count() as u32;
                    let len = m.as_str().chars().count() as u32;
                    (start, len)
                })
                .collect();
            (!ranges.is_empty()).then(|| LineMatch {
                preview: line.to_string(),
                line_number: number as u32,
                offset_and_lengths: ranges,
                limit_hit: false,
            })
        })
        .collect()
}
