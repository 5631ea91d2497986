use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A user-facing explanation of a degraded or refused search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchAlert {
    /// Stable tag used as a metrics label
    pub prometheus_type: String,
    pub title: String,
    pub description: String,

    /// Narrower or longer-running queries the user could try instead
    #[serde(default)]
    pub proposed_queries: Vec<ProposedQuery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedQuery {
    pub description: String,
    pub query: String,
}

impl SearchAlert {
    /// The search ran out of time before producing anything
    pub fn timeout(used: Duration, suggested: Duration) -> Self {
        Self {
            prometheus_type: "timed_out".to_string(),
            title: "Timed out while searching".to_string(),
            description: format!(
                "We weren't able to find any results in {}s.",
                used.as_secs().max(1)
            ),
            proposed_queries: vec![ProposedQuery {
                description: "query with longer timeout".to_string(),
                query: format!("timeout:{}s", suggested.as_secs()),
            }],
        }
    }

    /// An AND expression kept running short and hit the retry ceiling
    pub fn capped_and_expression() -> Self {
        Self {
            prometheus_type: "exceed_and_expression_search_limit".to_string(),
            title: "Too many files to search for expression".to_string(),
            description: "One expression in the query requires a lot of work! This can happen \
                with negated text searches like '-content:', not-expressions, or \
                and-expressions. Try using the '-file:' or '-repo:' filters to narrow your \
                search. We're working on improving this experience."
                .to_string(),
            proposed_queries: Vec::new(),
        }
    }

    /// A diff or commit search covered too many repositories
    pub fn too_many_repos_for_commit_search(result_type: &str, limit: usize) -> Self {
        Self {
            prometheus_type: format!("exceeded_{}_search_limit", result_type),
            title: format!("Too many matching repositories for {} search to handle", result_type),
            description: format!(
                "{} search can currently only handle searching over {} repositories at a time. \
                 Try using the \"repo:\" filter to narrow down which repositories to search, \
                 or using 'after:\"1 week ago\"'.",
                result_type, limit
            ),
            proposed_queries: vec![ProposedQuery {
                description: "restrict to recent changes".to_string(),
                query: "after:\"1 week ago\"".to_string(),
            }],
        }
    }

    /// Some requested revisions do not exist
    pub fn missing_repo_revs(missing: &[String]) -> Self {
        let description = if missing.len() == 1 {
            format!("The repository {} matched by your query does not contain the requested revision.", missing[0])
        } else {
            format!(
                "{} repositories matched by your query do not contain the requested revisions: {}",
                missing.len(),
                missing.join(", ")
            )
        };
        Self {
            prometheus_type: "missing_repo_revs".to_string(),
            title: "Some repositories could not be searched".to_string(),
            description,
            proposed_queries: Vec::new(),
        }
    }

    /// The query scope resolved to no repositories at all
    pub fn no_resolved_repos() -> Self {
        Self {
            prometheus_type: "no_resolved_repos".to_string(),
            title: "No repositories found".to_string(),
            description: "Try alternate spellings or patterns for your repository filters."
                .to_string(),
            proposed_queries: Vec::new(),
        }
    }
}
