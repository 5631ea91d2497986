//! Search execution
//!
//! [`SearchService`] is the entry point. For each call it derives the
//! deadline and scope from the query, then evaluates the query tree with a
//! [`SearchPipeline`] running every leaf:
//!
//! ```text
//! SearchService ── Evaluator (AND / OR)
//!                     │
//!                     ▼ leaf
//!                  SearchPipeline ── repo names
//!                     │           ── diff / commit (CommitSearcher)
//!                     ▼
//!                  files: partition ──┬── IndexSearcher
//!                                     └── UnindexedSearcher
//!                                          │
//!                                          ▼
//!                                   fair flattening
//! ```

mod commits;
mod files;
pub mod metrics;
mod pipeline;
mod repos;
mod service;
pub mod timeout;

pub use commits::{check_repo_limit, CommitSearchRequest, CommitSearcher};
pub use files::search_files_in_repos;
pub use metrics::{init_search_metrics, SEARCH_METRICS};
pub use pipeline::{SearchArgs, SearchBackends, SearchPipeline};
pub use repos::search_repositories;
pub use service::{SearchRequest, SearchService};
