//! Error types for the tracker reconciliation system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the tracker system
#[derive(Error, Debug)]
pub enum Error {
    /// Source registration rejected (empty name, bad interval, duplicate, running engine)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not permitted in the current engine state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A source adapter failed to reach or parse its feed
    #[error("Fetch from {source_name} failed: {message}")]
    Fetch {
        /// Source name
        source_name: String,
        /// Error message
        message: String,
    },

    /// A source returned an empty snapshot; the cycle is skipped
    #[error("Source {0} returned an empty snapshot")]
    EmptySnapshot(String),

    /// A storage write failed in the middle of a reconciliation cycle
    #[error("Reconciliation of {source_name} aborted at {tracker}: {message}")]
    Reconcile {
        /// Source name
        source_name: String,
        /// Identity of the tracker whose write failed
        tracker: String,
        /// Error message
        message: String,
    },

    /// Insert of an identity that is already stored
    #[error("Tracker already exists: {0}")]
    AlreadyExists(String),

    /// Record or source not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid query argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage backend errors
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors (from source adapters)
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Categorized error code for query callers
///
/// This is what a transport layer maps onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Nothing matched the query
    NotFound,
    /// The caller supplied a bad argument
    InvalidArgument,
    /// The operation is not allowed in the current state
    FailedPrecondition,
    /// The entity already exists
    AlreadyExists,
    /// An upstream feed could not be reached
    Unavailable,
    /// Storage or other internal failure
    Internal,
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a fetch error for a source
    pub fn fetch(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a reconciliation error
    pub fn reconcile(
        source_name: impl Into<String>,
        tracker: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Reconcile {
            source_name: source_name.into(),
            tracker: tracker.into(),
            message: message.into(),
        }
    }

    /// Create an "already exists" error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Categorize this error for query callers
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidInput(_) | Self::Validation(_) | Self::Config(_) => {
                ErrorCode::InvalidArgument
            }
            Self::InvalidState(_) => ErrorCode::FailedPrecondition,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::Fetch { .. } | Self::EmptySnapshot(_) | Self::Http(_) => ErrorCode::Unavailable,
            Self::Reconcile { .. }
            | Self::Store(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorCode::Internal,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
