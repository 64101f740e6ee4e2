//! Error types for depscore.

use thiserror::Error;

/// Main error type for depscore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed before a response was received
    #[error("HTTP error: {0}")]
    Http(String),

    /// Scoring API returned a non-success status
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Scoring API answered with an empty body
    #[error("Empty response from scoring API")]
    EmptyResponse,

    /// Response payload could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// API credential missing or unusable
    #[error("Credential error: {0}")]
    Credential(String),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Build an error from a non-success HTTP status and its body.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the error came from the remote side rather than from us.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Api { .. } | Error::EmptyResponse | Error::InvalidData(_)
        )
    }
}

/// Result type alias for depscore operations.
pub type Result<T> = std::result::Result<T, Error>;
