//! In-memory index service used by the CLI and tests

use super::client::{
    IndexError, IndexFileMatch, IndexFragment, IndexLineMatch, IndexSearchOptions,
    IndexSearchResult, IndexSearchStats, IndexService, IndexSymbol, IndexedRepository,
};
use crate::compiler::IndexQuery;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A symbol definition stored with a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: String,

    #[serde(default)]
    pub parent: Option<String>,

    /// 0-based
    pub line: u32,
}

/// One file as the index stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub path: String,
    pub content: String,

    /// Branches containing this version of the file; empty means all branches
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default)]
    pub symbols: Vec<DocumentSymbol>,
}

struct StoredRepo {
    info: IndexedRepository,
    documents: Vec<IndexedDocument>,
}

/// [`IndexService`] over repositories held in memory
pub struct InMemoryIndex {
    repos: Arc<DashMap<String, StoredRepo>>,
    enabled: AtomicBool,
    available: AtomicBool,
    latency: Mutex<Duration>,
    searches: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            repos: Arc::new(DashMap::new()),
            enabled: AtomicBool::new(true),
            available: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
            searches: AtomicUsize::new(0),
        }
    }

    pub fn add_repository(&self, info: IndexedRepository, documents: Vec<IndexedDocument>) {
        tracing::debug!(repo = %info.name, documents = documents.len(), "Repository indexed");
        self.repos
            .insert(info.name.clone(), StoredRepo { info, documents });
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Simulate an outage: listing and searching fail while unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay applied to every list and search call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of search calls served so far
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), IndexError> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("in-memory index is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexService for InMemoryIndex {
    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn list(&self) -> Result<Vec<IndexedRepository>, IndexError> {
        self.simulate().await?;
        let mut repos: Vec<IndexedRepository> =
            self.repos.iter().map(|entry| entry.info.clone()).collect();
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }

    async fn search(
        &self,
        query: &IndexQuery,
        options: &IndexSearchOptions,
    ) -> Result<IndexSearchResult, IndexError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        let matcher = Matcher::build(query)?;

        let mut names: Vec<String> = self.repos.iter().map(|e| e.key().clone()).collect();
        names.sort();

        let mut files = Vec::new();
        let mut stats = IndexSearchStats::default();
        for name in names {
            let Some(repo) = self.repos.get(&name) else {
                continue;
            };
            for doc in &repo.documents {
                if let Some(file) = match_document(&matcher, &repo, doc) {
                    stats.match_count += file
                        .line_matches
                        .iter()
                        .map(|l| l.fragments.len().max(1))
                        .sum::<usize>()
                        .max(1);
                    files.push(file);
                }
            }
        }

        stats.file_count = files.len();
        if files.len() > options.max_doc_display_count {
            stats.files_skipped = files.len() - options.max_doc_display_count;
            files.truncate(options.max_doc_display_count);
        }
        Ok(IndexSearchResult { files, stats })
    }
}

/// Query tree with its regular expressions compiled
enum Matcher {
    Const(bool),
    Text {
        re: Regex,
        file_name: bool,
        content: bool,
    },
    Symbol(Box<Matcher>),
    Not(Box<Matcher>),
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    RepoContains(Box<Matcher>),
    RepoBranches(BTreeMap<String, Vec<String>>),
    Branch(String),
}

impl Matcher {
    fn build(query: &IndexQuery) -> Result<Matcher, IndexError> {
        Ok(match query {
            IndexQuery::Const(b) => Matcher::Const(*b),
            IndexQuery::Substring {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => Matcher::Text {
                re: build_regex(&regex::escape(pattern), *case_sensitive)?,
                file_name: *file_name,
                content: *content,
            },
            IndexQuery::Regexp {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => Matcher::Text {
                re: build_regex(pattern, *case_sensitive)?,
                file_name: *file_name,
                content: *content,
            },
            IndexQuery::Symbol(inner) => Matcher::Symbol(Box::new(Matcher::build(inner)?)),
            IndexQuery::Not(inner) => Matcher::Not(Box::new(Matcher::build(inner)?)),
            IndexQuery::And(children) => {
                Matcher::And(children.iter().map(Matcher::build).collect::<Result<_, _>>()?)
            }
            IndexQuery::Or(children) => {
                Matcher::Or(children.iter().map(Matcher::build).collect::<Result<_, _>>()?)
            }
            IndexQuery::RepoContains(inner) => {
                Matcher::RepoContains(Box::new(Matcher::build(inner)?))
            }
            IndexQuery::RepoBranches(map) => Matcher::RepoBranches(map.clone()),
            IndexQuery::Branch(name) => Matcher::Branch(name.clone()),
        })
    }
}

fn build_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, IndexError> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| IndexError::Failed(e.to_string()))
}

enum Hit {
    FileName {
        start: usize,
        end: usize,
    },
    Content {
        line: usize,
        start: usize,
        end: usize,
        symbol: Option<IndexSymbol>,
    },
}

struct DocContext<'a> {
    repo: &'a StoredRepo,
    doc: &'a IndexedDocument,
    branch: &'a str,
    is_head: bool,
}

fn on_branch(doc: &IndexedDocument, branch: &str) -> bool {
    doc.branches.is_empty() || doc.branches.iter().any(|b| b == branch)
}

/// `None` when the document does not match, otherwise the hits that justify the match
fn evaluate(matcher: &Matcher, ctx: &DocContext<'_>) -> Option<Vec<Hit>> {
    match matcher {
        Matcher::Const(true) => Some(Vec::new()),
        Matcher::Const(false) => None,
        Matcher::Text {
            re,
            file_name,
            content,
        } => {
            let mut hits = Vec::new();
            let path_only = *file_name && !*content;
            let content_only = *content && !*file_name;
            if !content_only {
                hits.extend(re.find_iter(&ctx.doc.path).map(|m| Hit::FileName {
                    start: m.start(),
                    end: m.end(),
                }));
            }
            if !path_only {
                for (line, text) in ctx.doc.content.split('\n').enumerate() {
                    hits.extend(re.find_iter(text).map(|m| Hit::Content {
                        line,
                        start: m.start(),
                        end: m.end(),
                        symbol: None,
                    }));
                }
            }
            if hits.is_empty() {
                None
            } else {
                Some(hits)
            }
        }
        Matcher::Symbol(inner) => {
            let Matcher::Text { re, .. } = inner.as_ref() else {
                return evaluate(inner, ctx);
            };
            let lines: Vec<&str> = ctx.doc.content.split('\n').collect();
            let hits: Vec<Hit> = ctx
                .doc
                .symbols
                .iter()
                .filter(|symbol| re.is_match(&symbol.name))
                .map(|symbol| {
                    let text = lines.get(symbol.line as usize).copied().unwrap_or("");
                    let start = text.find(&symbol.name).unwrap_or(0);
                    Hit::Content {
                        line: symbol.line as usize,
                        start,
                        end: start + if text.is_empty() { 0 } else { symbol.name.len() },
                        symbol: Some(IndexSymbol {
                            sym: symbol.name.clone(),
                            kind: symbol.kind.clone(),
                            parent: symbol.parent.clone(),
                        }),
                    }
                })
                .collect();
            if hits.is_empty() {
                None
            } else {
                Some(hits)
            }
        }
        Matcher::Not(inner) => match evaluate(inner, ctx) {
            Some(_) => None,
            None => Some(Vec::new()),
        },
        Matcher::And(children) => {
            let mut hits = Vec::new();
            for child in children {
                hits.extend(evaluate(child, ctx)?);
            }
            Some(hits)
        }
        Matcher::Or(children) => {
            let mut matched = false;
            let mut hits = Vec::new();
            for child in children {
                if let Some(child_hits) = evaluate(child, ctx) {
                    matched = true;
                    hits.extend(child_hits);
                }
            }
            matched.then_some(hits)
        }
        Matcher::RepoContains(inner) => {
            let found = ctx.repo.documents.iter().any(|doc| {
                on_branch(doc, ctx.branch)
                    && evaluate(
                        inner,
                        &DocContext {
                            repo: ctx.repo,
                            doc,
                            branch: ctx.branch,
                            is_head: ctx.is_head,
                        },
                    )
                    .is_some()
            });
            found.then(Vec::new)
        }
        Matcher::RepoBranches(map) => map
            .get(&ctx.repo.info.name)
            .filter(|branches| branches.iter().any(|b| b == ctx.branch))
            .map(|_| Vec::new()),
        Matcher::Branch(name) => {
            (name == ctx.branch || (name == "HEAD" && ctx.is_head)).then(Vec::new)
        }
    }
}

fn match_document(
    matcher: &Matcher,
    repo: &StoredRepo,
    doc: &IndexedDocument,
) -> Option<IndexFileMatch> {
    let mut matched_branches = Vec::new();
    let mut version = None;
    let mut hits = None;

    for (position, branch) in repo.info.branches.iter().enumerate() {
        if !on_branch(doc, &branch.name) {
            continue;
        }
        let ctx = DocContext {
            repo,
            doc,
            branch: &branch.name,
            is_head: position == 0,
        };
        if let Some(branch_hits) = evaluate(matcher, &ctx) {
            matched_branches.push(branch.name.clone());
            if hits.is_none() {
                hits = Some(branch_hits);
                version = Some(branch.version.clone());
            }
        }
    }

    let hits = hits?;
    Some(IndexFileMatch {
        repository: repo.info.name.clone(),
        file_name: doc.path.clone(),
        branches: matched_branches,
        version: version.unwrap_or_default(),
        line_matches: group_hits(doc, hits),
    })
}

fn group_hits(doc: &IndexedDocument, hits: Vec<Hit>) -> Vec<IndexLineMatch> {
    let lines: Vec<&str> = doc.content.split('\n').collect();
    let mut by_line: BTreeMap<usize, Vec<IndexFragment>> = BTreeMap::new();
    let mut file_name_fragments = Vec::new();
    let mut seen = HashSet::new();

    for hit in hits {
        match hit {
            Hit::FileName { start, end } => {
                if seen.insert((usize::MAX, start, end)) {
                    file_name_fragments.push(IndexFragment {
                        line_offset: start,
                        match_length: end - start,
                        symbol: None,
                    });
                }
            }
            Hit::Content {
                line,
                start,
                end,
                symbol,
            } => {
                if seen.insert((line, start, end)) {
                    by_line.entry(line).or_default().push(IndexFragment {
                        line_offset: start,
                        match_length: end - start,
                        symbol,
                    });
                }
            }
        }
    }

    let mut line_matches = Vec::new();
    if !file_name_fragments.is_empty() {
        line_matches.push(IndexLineMatch {
            line: doc.path.clone(),
            line_number: 0,
            file_name: true,
            fragments: file_name_fragments,
        });
    }
    for (line, mut fragments) in by_line {
        fragments.sort_by_key(|f| f.line_offset);
        line_matches.push(IndexLineMatch {
            line: lines.get(line).copied().unwrap_or("").to_string(),
            line_number: line as u32 + 1,
            file_name: false,
            fragments,
        });
    }
    line_matches
}
