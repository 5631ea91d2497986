//! Result aggregation
//!
//! [`Aggregator`] is the single merge point for results and statistics,
//! [`WorkScope`] runs required and optional result-type searches, and
//! [`SearchResults`] is what a finished search returns.

mod aggregator;
mod common;
mod results;
mod scope;

pub use aggregator::{AggregateOutcome, Aggregator};
pub use common::{ExcludedRepos, SearchResultsCommon};
pub use results::SearchResults;
pub use scope::WorkScope;
