//! Boolean query evaluation
//!
//! The query arrives as a tree of patterns joined by AND/OR, plus scope
//! parameters (`repo:`, `file:`, `count:` ...). Leaves run the full search
//! pipeline; inner nodes intersect or union their operands' file matches.

mod evaluator;
pub mod leaf;
mod merge;
mod query;

pub use evaluator::{Evaluator, LeafEvaluator};
pub use merge::{intersect_merge, union_merge};
pub use query::{
    parse_duration, partition_search_pattern, Field, Parameter, QueryNode, ScopeParameters,
    MAX_COUNT,
};
