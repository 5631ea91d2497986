//! Error types for pattern compilation

use crate::error::AppError;

/// Errors raised while turning a pattern into backend queries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The search pattern is not a valid regular expression
    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A file, repohasfile or language path filter is not a valid regular expression
    #[error("invalid path filter {pattern:?}: {message}")]
    InvalidPathPattern { pattern: String, message: String },

    /// `lang:` named a language we have no extensions for
    #[error("unknown language: {0}")]
    UnknownLanguage(String),

    #[error("structural search patterns cannot be negated")]
    NegatedStructural,

    #[error("negation is only supported for a single pattern")]
    NegatedConcatenation,

    #[error("file match limit must be greater than zero")]
    ZeroFileMatchLimit,
}

impl From<CompileError> for AppError {
    fn from(err: CompileError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
