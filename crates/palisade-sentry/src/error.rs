//! Error types for the sentry engine.

use thiserror::Error;

/// Errors that can occur in sentry operations.
///
/// Enforcement paths (verdicts, kicks, bans) are deliberately infallible;
/// errors here surface only from the persistence and configuration edges.
#[derive(Debug, Error)]
pub enum SentryError {
    /// An I/O error occurred while reading or writing a list file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization of a list record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persistence writer task is no longer accepting snapshots.
    #[error("list store writer unavailable")]
    ListsUnavailable,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for sentry operations.
pub type SentryResult<T> = Result<T, SentryError>;
