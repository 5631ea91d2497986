//! Pattern compilation
//!
//! Turns a [`PatternInfo`] into the two forms the executors need:
//!
//! - an [`IndexQuery`] tree for the index service, and
//! - a [`BackendPattern`] descriptor for the unindexed backend search service.
//!
//! Every regular expression involved (the pattern itself and all path
//! filters) is validated up front. The first malformed one aborts
//! compilation, so no partial query is ever issued.

mod error;
pub mod language;
mod query;

pub use error::CompileError;
pub use query::IndexQuery;

use crate::models::{PatternInfo, PatternType};
use serde::{Deserialize, Serialize};

/// Whether the pattern targets text or symbol definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    Text,
    Symbol,
}

/// Pattern and path filters in the backend search service's wire form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendPattern {
    pub pattern: String,
    pub is_regexp: bool,
    pub is_structural: bool,
    pub is_case_sensitive: bool,
    pub is_negated: bool,
    pub include_patterns: Vec<String>,
    pub exclude_pattern: Option<String>,
    pub path_patterns_are_case_sensitive: bool,
    pub file_match_limit: usize,
    pub pattern_matches_content: bool,
    pub pattern_matches_path: bool,
}

impl BackendPattern {
    /// Path-only probe used to check "repository contains a file matching P"
    pub fn path_probe(pattern: &str, case_sensitive: bool) -> Self {
        Self {
            pattern: pattern.to_string(),
            is_regexp: true,
            is_structural: false,
            is_case_sensitive: case_sensitive,
            is_negated: false,
            include_patterns: Vec::new(),
            exclude_pattern: None,
            path_patterns_are_case_sensitive: case_sensitive,
            file_match_limit: 1,
            pattern_matches_content: false,
            pattern_matches_path: true,
        }
    }
}

/// Output of [`compile`]
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub index_query: IndexQuery,
    pub backend: BackendPattern,
}

/// Reject patterns that can never be executed
pub fn validate(info: &PatternInfo) -> Result<(), CompileError> {
    if info.file_match_limit == 0 {
        return Err(CompileError::ZeroFileMatchLimit);
    }
    if info.is_structural() && info.is_negated {
        return Err(CompileError::NegatedStructural);
    }
    if info.is_regexp() {
        check_regex(&info.pattern).map_err(|message| CompileError::InvalidPattern {
            pattern: info.pattern.clone(),
            message,
        })?;
    }
    let path_patterns = info
        .include_patterns
        .iter()
        .chain(info.exclude_pattern.iter())
        .chain(info.repo_has_file_include.iter())
        .chain(info.repo_has_file_exclude.iter());
    for pattern in path_patterns {
        check_regex(pattern).map_err(|message| CompileError::InvalidPathPattern {
            pattern: pattern.clone(),
            message,
        })?;
    }
    Ok(())
}

fn check_regex(pattern: &str) -> Result<(), String> {
    regex::Regex::new(pattern).map(|_| ()).map_err(|e| e.to_string())
}

/// Compile a pattern for both search paths
pub fn compile(info: &PatternInfo, mode: CompileMode) -> Result<CompiledQuery, CompileError> {
    validate(info)?;

    let mut terms = Vec::new();

    let mut core = pattern_term(info);
    if mode == CompileMode::Symbol {
        core = IndexQuery::Symbol(Box::new(core));
    }
    if info.is_negated {
        core = IndexQuery::not(core);
    }
    terms.push(core);

    let case = info.path_patterns_are_case_sensitive;
    for include in &info.include_patterns {
        terms.push(IndexQuery::file_regexp(include, case));
    }
    if let Some(exclude) = &info.exclude_pattern {
        terms.push(IndexQuery::not(IndexQuery::file_regexp(exclude, case)));
    }
    for pattern in &info.repo_has_file_include {
        terms.push(IndexQuery::RepoContains(Box::new(IndexQuery::file_regexp(
            pattern, case,
        ))));
    }
    for pattern in &info.repo_has_file_exclude {
        terms.push(IndexQuery::not(IndexQuery::RepoContains(Box::new(
            IndexQuery::file_regexp(pattern, case),
        ))));
    }

    let index_query = IndexQuery::And(terms).simplify();

    let backend = BackendPattern {
        pattern: info.pattern.clone(),
        is_regexp: info.is_regexp(),
        is_structural: info.is_structural(),
        is_case_sensitive: info.is_case_sensitive,
        is_negated: info.is_negated,
        include_patterns: info.include_patterns.clone(),
        exclude_pattern: info.exclude_pattern.clone(),
        path_patterns_are_case_sensitive: info.path_patterns_are_case_sensitive,
        file_match_limit: info.file_match_limit,
        pattern_matches_content: info.pattern_matches_content,
        pattern_matches_path: info.pattern_matches_path,
    };

    Ok(CompiledQuery {
        index_query,
        backend,
    })
}

/// The core pattern term, before symbol or negation wrapping
fn pattern_term(info: &PatternInfo) -> IndexQuery {
    // Structural matching happens in the backend; the index only narrows by path.
    if info.is_empty() || info.is_structural() {
        return IndexQuery::Const(true);
    }

    let (file_name, content) = match (info.pattern_matches_path, info.pattern_matches_content) {
        (true, false) => (true, false),
        (false, true) => (false, true),
        _ => (false, false),
    };

    match info.pattern_type {
        PatternType::Regexp if !is_plain_literal(&info.pattern) => IndexQuery::Regexp {
            pattern: info.pattern.clone(),
            case_sensitive: info.is_case_sensitive,
            file_name,
            content,
        },
        _ => IndexQuery::Substring {
            pattern: info.pattern.clone(),
            case_sensitive: info.is_case_sensitive,
            file_name,
            content,
        },
    }
}

/// A regexp with no metacharacters matches exactly its own text
fn is_plain_literal(pattern: &str) -> bool {
    regex::escape(pattern) == pattern
}

/// Join pattern pieces so that they must appear in order: `(a).*?(b)`
pub fn ordered_fuzzy_regexp(pieces: &[String]) -> String {
    match pieces {
        [] => String::new(),
        [single] => single.clone(),
        _ => pieces
            .iter()
            .map(|piece| format!("({})", piece))
            .collect::<Vec<_>>()
            .join(".*?"),
    }
}

/// Regex matching any of the given regexes
pub fn union_regexps(patterns: &[String]) -> String {
    match patterns {
        [] => String::new(),
        [single] => single.clone(),
        _ => patterns
            .iter()
            .map(|p| format!("(?:{})", p))
            .collect::<Vec<_>>()
            .join("|"),
    }
}
