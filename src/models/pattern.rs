use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the pattern string is interpreted
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PatternType {
    #[default]
    Literal,
    Regexp,
    Structural,
}

/// Everything one leaf evaluation needs to know about the pattern and its
/// path scope. Built once per leaf and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInfo {
    pub pattern: String,

    #[serde(default)]
    pub pattern_type: PatternType,

    #[serde(default)]
    pub is_case_sensitive: bool,

    #[serde(default)]
    pub is_negated: bool,

    /// Soft cap on the number of distinct files returned
    pub file_match_limit: usize,

    /// Path regexes a file must match (all of them)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Path regex a file must not match
    #[serde(default)]
    pub exclude_pattern: Option<String>,

    #[serde(default)]
    pub path_patterns_are_case_sensitive: bool,

    /// Path regexes of which the repository must contain a match
    #[serde(default)]
    pub repo_has_file_include: Vec<String>,

    /// Path regexes of which the repository must not contain a match
    #[serde(default)]
    pub repo_has_file_exclude: Vec<String>,

    /// Languages the include/exclude patterns were derived from
    #[serde(default)]
    pub languages: Vec<String>,

    #[serde(default = "default_true")]
    pub pattern_matches_content: bool,

    #[serde(default = "default_true")]
    pub pattern_matches_path: bool,
}

fn default_true() -> bool {
    true
}

impl PatternInfo {
    pub fn new(pattern: impl Into<String>, pattern_type: PatternType, file_match_limit: usize) -> Self {
        Self {
            pattern: pattern.into(),
            pattern_type,
            is_case_sensitive: false,
            is_negated: false,
            file_match_limit,
            include_patterns: Vec::new(),
            exclude_pattern: None,
            path_patterns_are_case_sensitive: false,
            repo_has_file_include: Vec::new(),
            repo_has_file_exclude: Vec::new(),
            languages: Vec::new(),
            pattern_matches_content: true,
            pattern_matches_path: true,
        }
    }

    pub fn is_regexp(&self) -> bool {
        self.pattern_type == PatternType::Regexp
    }

    pub fn is_structural(&self) -> bool {
        self.pattern_type == PatternType::Structural
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Whether the query filters by repository contents
    pub fn has_repo_file_constraints(&self) -> bool {
        !self.repo_has_file_include.is_empty() || !self.repo_has_file_exclude.is_empty()
    }

    pub fn with_file_match_limit(&self, file_match_limit: usize) -> Self {
        Self {
            file_match_limit,
            ..self.clone()
        }
    }
}
