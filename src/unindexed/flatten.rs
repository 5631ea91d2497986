//! Fairness-balancing flattening of per-repository matches

use crate::models::FileMatch;

/// Flatten per-repository match groups into at most `limit` matches.
///
/// Groups are ordered by the URI of their first match. A first pass gives
/// every group `limit / groups` slots, then the remaining slots are handed
/// out group by group in the same order. The output is sorted by URI so the
/// result does not depend on completion order.
pub fn flatten_file_matches(groups: Vec<Vec<FileMatch>>, limit: usize) -> Vec<FileMatch> {
    let mut groups: Vec<Vec<FileMatch>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
    groups.sort_by_cached_key(|group| group[0].uri());

    let total: usize = groups.iter().map(Vec::len).sum();
    let mut flattened = Vec::with_capacity(total.min(limit));

    if total <= limit {
        flattened.extend(groups.into_iter().flatten());
    } else if !groups.is_empty() {
        let fair_share = limit / groups.len();
        let mut leftovers = Vec::with_capacity(groups.len());
        for mut group in groups {
            let rest = group.split_off(fair_share.min(group.len()));
            flattened.extend(group);
            leftovers.push(rest);
        }
        for group in leftovers {
            let room = limit - flattened.len();
            if room == 0 {
                break;
            }
            flattened.extend(group.into_iter().take(room));
        }
    }

    flattened.sort_by_cached_key(FileMatch::uri);
    flattened
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Repo;
    use std::collections::HashSet;

    fn group(repo: &str, n: usize) -> Vec<FileMatch> {
        (0..n)
            .map(|i| FileMatch::new(Repo::new(0, repo), "c", format!("f{:02}", i)))
            .collect()
    }

    #[test]
    fn test_under_limit_keeps_everything() {
        let out = flatten_file_matches(vec![group("b", 2), group("a", 1)], 10);
        let uris: Vec<String> = out.iter().map(FileMatch::uri).collect();
        assert_eq!(uris, vec!["a#f00", "b#f00", "b#f01"]);
    }

    #[test]
    fn test_every_repo_contributes() {
        let groups = vec![group("c", 50), group("a", 50), group("b", 50), group("d", 50)];
        let out = flatten_file_matches(groups, 10);
        assert_eq!(out.len(), 10);
        let repos: HashSet<&str> = out.iter().map(|m| m.repo.name.as_str()).collect();
        assert_eq!(repos.len(), 4);

        // fair share 2 each, the 2 leftover slots go to the first groups in order
        let count = |name: &str| out.iter().filter(|m| m.repo.name == name).count();
        assert_eq!(count("a"), 4);
        assert_eq!(count("b"), 2);
        assert_eq!(count("c"), 2);
        assert_eq!(count("d"), 2);
    }

    #[test]
    fn test_small_groups_leave_room_for_big_ones() {
        let out = flatten_file_matches(vec![group("a", 1), group("b", 20)], 10);
        assert_eq!(out.len(), 10);
        assert_eq!(out.iter().filter(|m| m.repo.name == "b").count(), 9);
    }

    #[test]
    fn test_order_independent() {
        let one = flatten_file_matches(vec![group("a", 7), group("b", 7), group("c", 7)], 8);
        let two = flatten_file_matches(vec![group("c", 7), group("a", 7), group("b", 7)], 8);
        assert_eq!(one, two);
    }

    #[test]
    fn test_more_repos_than_limit() {
        let groups = (0..5).map(|i| group(&format!("r{}", i), 3)).collect();
        let out = flatten_file_matches(groups, 3);
        assert_eq!(out.len(), 3);
    }
}
