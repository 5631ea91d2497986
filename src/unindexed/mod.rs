//! Unindexed search
//!
//! Repositories the index does not cover are searched one by one on the
//! backend search service. Requests run concurrently under a resizable
//! [`MutableLimiter`], retry on another instance when one is unreachable,
//! and their per-repository results are balanced by
//! [`flatten_file_matches`] so every repository contributes.

mod client;
mod endpoints;
mod executor;
mod flatten;
mod limiter;
mod memory;

pub use client::{
    BackendFileMatch, BackendSearchRequest, BackendSearchResponse, BackendSearcher,
    RepoSearchError, RevisionResolver,
};
pub use endpoints::rendezvous_endpoint;
pub use executor::{
    handle_repo_search_result, UnindexedOutcome, UnindexedSearchRequest, UnindexedSearcher,
};
pub use flatten::flatten_file_matches;
pub use limiter::{LimiterPermit, MutableLimiter};
pub use memory::{BackendDocument, BackendRepository, InMemoryBackend};
