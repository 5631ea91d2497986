//! Repository name search

use crate::aggregate::SearchResultsCommon;
use crate::compiler::CompileError;
use crate::models::{PatternInfo, RepoMatch, RepositoryRevisions, SearchResult};
use regex::RegexBuilder;

/// Repositories whose name matches the pattern.
///
/// Queries that constrain file paths only produce file results, so they
/// yield no repository matches here.
pub fn search_repositories(
    info: &PatternInfo,
    repos: &[RepositoryRevisions],
) -> Result<(Vec<SearchResult>, SearchResultsCommon), CompileError> {
    let mut common = SearchResultsCommon::new();
    if !info.include_patterns.is_empty() || info.exclude_pattern.is_some() {
        return Ok((Vec::new(), common));
    }

    let pattern = if info.is_regexp() {
        info.pattern.clone()
    } else {
        regex::escape(&info.pattern)
    };
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(!info.is_case_sensitive)
        .build()
        .map_err(|e| CompileError::InvalidPattern {
            pattern: info.pattern.clone(),
            message: e.to_string(),
        })?;

    let mut results = Vec::new();
    for reporev in repos {
        if re.is_match(&reporev.repo.name) == info.is_negated {
            continue;
        }
        if results.len() == info.file_match_limit {
            common.limit_hit = true;
            break;
        }
        let rev = reporev.single_rev().filter(|r| !r.is_empty()).map(str::to_string);
        results.push(SearchResult::Repository(RepoMatch {
            repo: reporev.repo.clone(),
            rev,
        }));
    }

    common.result_count = results.len();
    Ok((results, common))
}
