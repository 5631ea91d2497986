//! Parsed query tree as the evaluator consumes it

use crate::error::{AppError, Result};
use crate::models::{PatternType, ResultType};
use crate::partition::IndexDirective;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};

/// Largest `count:` a query may ask for
pub const MAX_COUNT: usize = 100_000;

/// Fields a non-pattern parameter can name
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Field {
    Repo,
    File,
    Lang,
    RepoHasFile,
    Case,
    Count,
    Timeout,
    Type,
    Index,
    PatternType,
    After,
    Before,
}

/// A `field:value` scope parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub field: Field,
    pub value: String,

    #[serde(default)]
    pub negated: bool,
}

impl Parameter {
    pub fn new(field: Field, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            negated: false,
        }
    }

    pub fn negated(field: Field, value: impl Into<String>) -> Self {
        Self {
            negated: true,
            ..Self::new(field, value)
        }
    }
}

/// Node of the AND/OR expression tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QueryNode {
    Parameter(Parameter),
    Pattern {
        value: String,

        #[serde(default)]
        negated: bool,

        /// Overrides the query-wide pattern type
        #[serde(default)]
        pattern_type: Option<PatternType>,
    },
    /// Adjacent patterns searched as one
    Concat { operands: Vec<QueryNode> },
    And { operands: Vec<QueryNode> },
    Or { operands: Vec<QueryNode> },
}

impl QueryNode {
    pub fn pattern(value: impl Into<String>) -> Self {
        QueryNode::Pattern {
            value: value.into(),
            negated: false,
            pattern_type: None,
        }
    }

    pub fn and(operands: Vec<QueryNode>) -> Self {
        QueryNode::And { operands }
    }

    pub fn or(operands: Vec<QueryNode>) -> Self {
        QueryNode::Or { operands }
    }
}

/// Non-pattern parameters shared by every leaf of one query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeParameters {
    pub parameters: Vec<Parameter>,
}

impl ScopeParameters {
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self { parameters }
    }

    pub fn values(&self, field: Field) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(move |p| p.field == field)
    }

    fn last(&self, field: Field) -> Option<&str> {
        self.values(field).last().map(|p| p.value.as_str())
    }

    pub fn has(&self, field: Field) -> bool {
        self.values(field).next().is_some()
    }

    /// Copy with `count:` replaced
    pub fn with_count(&self, count: usize) -> Self {
        let mut parameters: Vec<Parameter> = self
            .parameters
            .iter()
            .filter(|p| p.field != Field::Count)
            .cloned()
            .collect();
        parameters.push(Parameter::new(Field::Count, count.to_string()));
        Self { parameters }
    }

    pub fn count(&self) -> Result<Option<usize>> {
        self.last(Field::Count)
            .map(|value| match value.parse::<usize>() {
                Ok(count) if count > 0 && count <= MAX_COUNT => Ok(count),
                Ok(count) if count > MAX_COUNT => Err(AppError::BadRequest(format!(
                    "count: must be at most {}, got {}",
                    MAX_COUNT, count
                ))),
                _ => Err(AppError::BadRequest(format!(
                    "count: requires a positive integer, got {:?}",
                    value
                ))),
            })
            .transpose()
    }

    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.last(Field::Timeout).map(parse_duration).transpose()
    }

    pub fn case_sensitive(&self) -> bool {
        self.last(Field::Case).is_some_and(|v| v.eq_ignore_ascii_case("yes"))
    }

    pub fn pattern_type(&self) -> Result<PatternType> {
        match self.last(Field::PatternType) {
            None => Ok(PatternType::default()),
            Some(value) => PatternType::from_str(value)
                .map_err(|_| AppError::BadRequest(format!("unknown pattern type {:?}", value))),
        }
    }

    pub fn index_directive(&self) -> Result<IndexDirective> {
        match self.last(Field::Index) {
            None => Ok(IndexDirective::default()),
            Some(value) => IndexDirective::from_str(&value.to_ascii_lowercase())
                .map_err(|_| AppError::BadRequest(format!("invalid index: value {:?}", value))),
        }
    }

    /// Result types named by `type:`, or the defaults
    pub fn result_types(&self) -> Result<Vec<ResultType>> {
        let mut types = Vec::new();
        for p in self.values(Field::Type) {
            let result_type = ResultType::from_str(&p.value)
                .map_err(|_| AppError::BadRequest(format!("unknown result type {:?}", p.value)))?;
            if !types.contains(&result_type) {
                types.push(result_type);
            }
        }
        if types.is_empty() {
            types = ResultType::defaults();
        }
        Ok(types)
    }

    pub fn has_commit_time_filter(&self) -> bool {
        self.has(Field::After) || self.has(Field::Before)
    }
}

/// Parse `500ms`, `30s`, `2m` or a bare number of seconds
pub fn parse_duration(value: &str) -> Result<Duration> {
    let invalid = || AppError::BadRequest(format!("invalid duration {:?}", value));
    let value = value.trim();
    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => value.split_at(split),
        None => (value, "s"),
    };
    let number: u64 = number.parse().map_err(|_| invalid())?;
    match unit {
        "ms" => Ok(Duration::from_millis(number)),
        "s" => Ok(Duration::from_secs(number)),
        "m" => number
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Hoist top-level parameters into the scope; several top-level patterns
/// form an implicit AND
pub fn partition_search_pattern(nodes: Vec<QueryNode>) -> (ScopeParameters, Option<QueryNode>) {
    let mut parameters = Vec::new();
    let mut patterns = Vec::new();
    for node in nodes {
        match node {
            QueryNode::Parameter(p) => parameters.push(p),
            other => patterns.push(other),
        }
    }

    let pattern = match patterns.len() {
        0 => None,
        1 => patterns.pop(),
        _ => Some(QueryNode::And { operands: patterns }),
    };
    (ScopeParameters::new(parameters), pattern)
}
