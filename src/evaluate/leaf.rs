//! Building the pattern description for one leaf

use super::query::{Field, QueryNode, ScopeParameters};
use crate::compiler::language::language_path_regexps;
use crate::compiler::{ordered_fuzzy_regexp, union_regexps, CompileError};
use crate::error::Result;
use crate::models::{PatternInfo, PatternType, ResultType};

/// Combine a pattern node with the scope parameters.
///
/// `file:` and `lang:` become include patterns, their negations are folded
/// into one exclude pattern, and `repohasfile:` becomes a repository
/// constraint. The file match limit is `count:` or `default_max_results`.
pub fn pattern_info(
    scope: &ScopeParameters,
    node: &QueryNode,
    default_max_results: usize,
) -> Result<PatternInfo> {
    let query_type = scope.pattern_type()?;
    let (pattern, negated, pattern_type) = leaf_pattern(node, query_type)?;

    let limit = scope.count()?.unwrap_or(default_max_results);
    let mut info = PatternInfo::new(pattern, pattern_type, limit);
    info.is_negated = negated;
    info.is_case_sensitive = scope.case_sensitive();
    info.path_patterns_are_case_sensitive = info.is_case_sensitive;

    let mut excludes = Vec::new();
    for p in scope.values(Field::File) {
        if p.negated {
            excludes.push(p.value.clone());
        } else {
            info.include_patterns.push(p.value.clone());
        }
    }
    for p in scope.values(Field::Lang) {
        let regexps = language_path_regexps(&p.value)?;
        if p.negated {
            excludes.extend(regexps);
        } else {
            info.include_patterns.push(union_regexps(&regexps));
        }
        info.languages.push(p.value.clone());
    }
    if !excludes.is_empty() {
        info.exclude_pattern = Some(union_regexps(&excludes));
    }

    for p in scope.values(Field::RepoHasFile) {
        if p.negated {
            info.repo_has_file_exclude.push(p.value.clone());
        } else {
            info.repo_has_file_include.push(p.value.clone());
        }
    }

    let types = scope.result_types()?;
    let content = types.contains(&ResultType::File);
    let path = types.contains(&ResultType::Path);
    if content || path {
        info.pattern_matches_content = content;
        info.pattern_matches_path = path;
    }

    Ok(info)
}

/// Pattern text, negation and type of a leaf node
fn leaf_pattern(node: &QueryNode, query_type: PatternType) -> Result<(String, bool, PatternType)> {
    match node {
        QueryNode::Pattern {
            value,
            negated,
            pattern_type,
        } => Ok((value.clone(), *negated, pattern_type.unwrap_or(query_type))),
        QueryNode::Concat { operands } => {
            let mut pieces = Vec::with_capacity(operands.len());
            let mut pattern_type = query_type;
            for operand in operands {
                let (piece, negated, piece_type) = leaf_pattern(operand, query_type)?;
                if negated {
                    return Err(CompileError::NegatedConcatenation.into());
                }
                pattern_type = piece_type;
                pieces.push(piece);
            }
            let pattern = match pattern_type {
                PatternType::Regexp => ordered_fuzzy_regexp(&pieces),
                PatternType::Literal | PatternType::Structural => pieces.join(" "),
            };
            Ok((pattern, false, pattern_type))
        }
        // Parameters and operators are not patterns
        _ => Ok((String::new(), false, query_type)),
    }
}
