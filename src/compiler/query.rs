//! Index-service query expression tree

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Boolean query understood by the index service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexQuery {
    Const(bool),

    /// Plain substring. With neither `file_name` nor `content` set the term
    /// matches either the path or the content.
    Substring {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
        content: bool,
    },

    Regexp {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
        content: bool,
    },

    /// Restrict the inner term to symbol definitions
    Symbol(Box<IndexQuery>),

    Not(Box<IndexQuery>),
    And(Vec<IndexQuery>),
    Or(Vec<IndexQuery>),

    /// True for every file of a repository that has some file matching the inner term
    RepoContains(Box<IndexQuery>),

    /// Restrict to the listed branches per repository
    RepoBranches(BTreeMap<String, Vec<String>>),

    /// Restrict to one branch name in every repository ("HEAD" is the first branch)
    Branch(String),
}

impl IndexQuery {
    pub fn not(query: IndexQuery) -> Self {
        IndexQuery::Not(Box::new(query))
    }

    /// Path-only regexp term
    pub fn file_regexp(pattern: impl Into<String>, case_sensitive: bool) -> Self {
        IndexQuery::Regexp {
            pattern: pattern.into(),
            case_sensitive,
            file_name: true,
            content: false,
        }
    }

    /// Flatten nested and/or, fold constants and drop double negation
    pub fn simplify(self) -> Self {
        match self {
            IndexQuery::And(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children.into_iter().map(IndexQuery::simplify) {
                    match child {
                        IndexQuery::Const(true) => {}
                        IndexQuery::Const(false) => return IndexQuery::Const(false),
                        IndexQuery::And(grand) => flat.extend(grand),
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => IndexQuery::Const(true),
                    1 => flat.remove(0),
                    _ => IndexQuery::And(flat),
                }
            }
            IndexQuery::Or(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children.into_iter().map(IndexQuery::simplify) {
                    match child {
                        IndexQuery::Const(false) => {}
                        IndexQuery::Const(true) => return IndexQuery::Const(true),
                        IndexQuery::Or(grand) => flat.extend(grand),
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => IndexQuery::Const(false),
                    1 => flat.remove(0),
                    _ => IndexQuery::Or(flat),
                }
            }
            IndexQuery::Not(inner) => match inner.simplify() {
                IndexQuery::Const(b) => IndexQuery::Const(!b),
                IndexQuery::Not(grand) => *grand,
                other => IndexQuery::not(other),
            },
            IndexQuery::Symbol(inner) => IndexQuery::Symbol(Box::new(inner.simplify())),
            IndexQuery::RepoContains(inner) => IndexQuery::RepoContains(Box::new(inner.simplify())),
            other => other,
        }
    }
}

fn write_term(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    pattern: &str,
    case_sensitive: bool,
    file_name: bool,
    content: bool,
) -> fmt::Result {
    let scope = match (file_name, content) {
        (true, false) => "file_",
        (false, true) => "content_",
        _ => "",
    };
    let case = if case_sensitive { "case_" } else { "" };
    write!(f, "{}{}{}:{:?}", case, scope, kind, pattern)
}

fn write_list(f: &mut fmt::Formatter<'_>, op: &str, children: &[IndexQuery]) -> fmt::Result {
    write!(f, "({}", op)?;
    for child in children {
        write!(f, " {}", child)?;
    }
    f.write_str(")")
}

impl fmt::Display for IndexQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexQuery::Const(b) => write!(f, "{}", b),
            IndexQuery::Substring {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => write_term(f, "substr", pattern, *case_sensitive, *file_name, *content),
            IndexQuery::Regexp {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => write_term(f, "regex", pattern, *case_sensitive, *file_name, *content),
            IndexQuery::Symbol(inner) => write!(f, "sym:{}", inner),
            IndexQuery::Not(inner) => write!(f, "-{}", inner),
            IndexQuery::And(children) => write_list(f, "and", children),
            IndexQuery::Or(children) => write_list(f, "or", children),
            IndexQuery::RepoContains(inner) => write!(f, "repo_contains:{}", inner),
            IndexQuery::RepoBranches(map) => write!(f, "(repobranches {} repos)", map.len()),
            IndexQuery::Branch(name) => write!(f, "branch:{:?}", name),
        }
    }
}
