//! Query execution core for a code search service
//!
//! Given a parsed query and the repositories it resolved to, this crate:
//!
//! - **Partitions** repository revisions into those the pre-built index can
//!   serve and those that must be searched on the fly
//! - **Compiles** patterns into index queries and backend search requests
//! - **Fans out** to the index and to the unindexed backend concurrently,
//!   under a shared deadline and a resizable concurrency limit
//! - **Aggregates** per-repository results and statistics, balancing result
//!   slots fairly across repositories
//! - **Evaluates** AND/OR combinations of patterns with adaptive re-querying

pub mod aggregate;
pub mod compiler;
pub mod config;
pub mod corpus;
pub mod error;
pub mod evaluate;
pub mod index;
pub mod models;
pub mod partition;
pub mod search;
pub mod unindexed;

pub use error::{AppError, Result};
