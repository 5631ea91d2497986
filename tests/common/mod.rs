//! Common test utilities
//!
//! Builders for in-memory corpora and search services, plus a parser for
//! Prometheus exposition output.

#![allow(dead_code)]

use codesearch_core::config::Config;
use codesearch_core::evaluate::{Field, Parameter, QueryNode};
use codesearch_core::index::{IndexBranch, IndexedDocument, IndexedRepository, InMemoryIndex};
use codesearch_core::models::{Repo, RepositoryRevisions, SearchResult};
use codesearch_core::search::{SearchBackends, SearchRequest, SearchService};
use codesearch_core::unindexed::{BackendDocument, BackendRepository, InMemoryBackend};
use std::collections::HashMap;
use std::sync::Arc;

/// Index and backend shared by a test and the service under test
pub struct TestServices {
    pub index: Arc<InMemoryIndex>,
    pub backend: Arc<InMemoryBackend>,
    pub repos: Vec<RepositoryRevisions>,
}

impl TestServices {
    pub fn new(endpoints: &[&str]) -> Self {
        Self {
            index: Arc::new(InMemoryIndex::new()),
            backend: Arc::new(InMemoryBackend::new(
                endpoints.iter().map(|e| e.to_string()).collect(),
            )),
            repos: Vec::new(),
        }
    }

    /// Add a repository only the backend knows about
    pub fn unindexed_repo(&mut self, name: &str, files: &[(&str, &str)]) -> RepositoryRevisions {
        self.backend.add_repository(BackendRepository {
            name: name.to_string(),
            default_commit: format!("{:0>8}", self.repos.len() + 1),
            revisions: Default::default(),
            files: files
                .iter()
                .map(|(path, content)| BackendDocument {
                    path: path.to_string(),
                    content: content.to_string(),
                })
                .collect(),
            cloning: false,
        });
        self.push_repo(name)
    }

    /// Add a repository whose clone has not finished
    pub fn cloning_repo(&mut self, name: &str) -> RepositoryRevisions {
        self.backend.add_repository(BackendRepository {
            name: name.to_string(),
            default_commit: String::new(),
            revisions: Default::default(),
            files: Vec::new(),
            cloning: true,
        });
        self.push_repo(name)
    }

    /// Add a repository the index has built at its default branch
    pub fn indexed_repo(&mut self, name: &str, files: &[(&str, &str)]) -> RepositoryRevisions {
        self.index.add_repository(
            IndexedRepository {
                name: name.to_string(),
                branches: vec![IndexBranch {
                    name: "main".to_string(),
                    version: "feedface".to_string(),
                }],
                has_symbols: false,
            },
            files
                .iter()
                .map(|(path, content)| IndexedDocument {
                    path: path.to_string(),
                    content: content.to_string(),
                    branches: Vec::new(),
                    symbols: Vec::new(),
                })
                .collect(),
        );
        self.push_repo(name)
    }

    fn push_repo(&mut self, name: &str) -> RepositoryRevisions {
        let reporev = RepositoryRevisions::head(Repo::new(self.repos.len() as i32 + 1, name));
        self.repos.push(reporev.clone());
        reporev
    }

    pub fn service(&self) -> SearchService {
        self.service_with(Config::default())
    }

    pub fn service_with(&self, config: Config) -> SearchService {
        SearchService::new(SearchBackends::new(
            self.index.clone(),
            self.backend.clone(),
            self.backend.clone(),
            config,
        ))
    }

    /// A request over every repository added so far
    pub fn request(&self, query: Vec<QueryNode>) -> SearchRequest {
        SearchRequest {
            query,
            repos: self.repos.clone(),
            ..Default::default()
        }
    }
}

pub fn param(field: Field, value: &str) -> QueryNode {
    QueryNode::Parameter(Parameter::new(field, value))
}

/// URIs of the file results, in result order
pub fn file_uris(results: &[SearchResult]) -> Vec<String> {
    results
        .iter()
        .filter_map(SearchResult::as_file_match)
        .map(|m| m.uri())
        .collect()
}

/// Helper function to parse Prometheus exposition format
/// Returns a map of metric lines for easy assertion
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // HELP and TYPE comments
        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}
