//! Index search
//!
//! - [`IndexService`]: the pre-built index, consumed through a trait
//! - [`IndexSearcher`]: issues one query per request and converts hits into
//!   [`FileMatch`](crate::models::FileMatch) records
//! - [`InMemoryIndex`]: an in-process implementation for the CLI and tests

mod client;
mod executor;
mod memory;
pub mod options;

pub use client::{
    IndexBranch, IndexError, IndexFileMatch, IndexFragment, IndexLineMatch, IndexSearchOptions,
    IndexSearchResult, IndexSearchStats, IndexService, IndexSymbol, IndexedRepository,
};
pub use executor::{IndexSearchOutcome, IndexSearchRequest, IndexSearcher};
pub use memory::{DocumentSymbol, InMemoryIndex, IndexedDocument};
