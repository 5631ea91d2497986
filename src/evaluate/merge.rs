//! Set operations over leaf results, keyed by result URI

use crate::aggregate::SearchResults;
use crate::models::SearchResult;
use std::collections::HashMap;

/// Union: files present on both sides are merged (line matches
/// concatenated, limit-hit OR'd), everything else is kept once
pub fn union_merge(mut left: SearchResults, right: SearchResults) -> SearchResults {
    let mut positions: HashMap<String, usize> = left
        .results
        .iter()
        .enumerate()
        .map(|(i, r)| (r.uri(), i))
        .collect();

    for result in right.results {
        let uri = result.uri();
        match positions.get(&uri) {
            Some(&i) => {
                if let (Some(existing), SearchResult::File(other)) =
                    (left.results[i].as_file_match_mut(), &result)
                {
                    existing.append_matches(other);
                }
            }
            None => {
                positions.insert(uri, left.results.len());
                left.results.push(result);
            }
        }
    }

    left.common.update(&right.common);
    left.common.result_count = left.results.iter().map(SearchResult::result_count).sum();
    if left.alert.is_none() {
        left.alert = right.alert;
    }
    left
}

/// Intersection: only files present on both sides, with their matches merged
pub fn intersect_merge(mut left: SearchResults, right: SearchResults) -> SearchResults {
    let right_files: HashMap<String, &SearchResult> = right
        .results
        .iter()
        .filter(|r| matches!(r, SearchResult::File(_)))
        .map(|r| (r.uri(), r))
        .collect();

    let merged: Vec<SearchResult> = std::mem::take(&mut left.results)
        .into_iter()
        .filter_map(|mut result| {
            let other = right_files.get(&result.uri())?.as_file_match()?;
            result.as_file_match_mut()?.append_matches(other);
            Some(result)
        })
        .collect();

    left.results = merged;
    left.common.update(&right.common);
    left.common.result_count = left.results.iter().map(SearchResult::result_count).sum();
    if left.alert.is_none() {
        left.alert = right.alert;
    }
    left
}
