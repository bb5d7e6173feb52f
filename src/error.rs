//! Error types for replication feeds.

use crate::types::Token;
use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Unknown row type: {0}")]
    UnknownRowType(String),

    #[error("Malformed {tag} row: {reason}")]
    MalformedRow { tag: String, reason: String },

    #[error("Row type already registered: {0}")]
    DuplicateRowType(String),

    #[error("Stream already registered: {0}")]
    DuplicateStream(String),

    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    #[error("Invalid token range: from {from:?} is after to {to:?}")]
    InvalidRange { from: Token, to: Token },

    #[error("Authority unavailable: {0}")]
    TransientUnavailable(String),

    #[error("Authority returned data violating the row schema: {0}")]
    SchemaViolation(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Out of order token for stream {stream}: {got:?} after {last:?}")]
    OutOfOrder {
        stream: String,
        last: Token,
        got: Token,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FeedError {
    /// Whether the failed operation may be retried with unchanged arguments.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::TransientUnavailable(_))
    }

    pub(crate) fn malformed(tag: &str, reason: impl Into<String>) -> Self {
        FeedError::MalformedRow {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
