//! Error types for the Delve research engine.

use thiserror::Error;

/// Result type alias using Delve's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Delve operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Model inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model returned output that failed structured-output validation
    #[error("Schema error: {0}")]
    Schema(String),

    /// Web search failed
    #[error("Search error: {0}")]
    Search(String),

    /// Cache operation failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Configuration and input errors are permanent: the same request will
    /// fail the same way, so the invocation layer does not retry them.
    /// Schema errors stay retryable because model output varies between
    /// samples.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Config(_) | Error::InvalidInput(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
