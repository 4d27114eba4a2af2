//! Error types for the bridge
//!
//! Provides structured error handling using thiserror for every failure
//! the bridge can report: request validation, missing entities, errors
//! surfaced by the B2 API or its transport, and shape mismatches.

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Malformed or contradictory input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The handler does not implement the requested operation
    #[error("Operation {operation} is not supported for {kind}: {reason}")]
    Unsupported {
        kind: &'static str,
        operation: &'static str,
        reason: &'static str,
    },

    /// Target entity absent
    #[error("Could not find {what} for \"{id}\"")]
    NotFound { what: &'static str, id: String },

    /// Error response returned by the B2 API
    #[error("B2 API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// HTTP transport error
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Raw data does not fit the declared keep-shape schema
    #[error("Shape error: {0}")]
    Shape(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed endpoint URL
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Shorthand for a request validation failure
    pub fn invalid(msg: impl Into<String>) -> Self {
        BridgeError::InvalidRequest(msg.into())
    }

    /// B2 error code, when the error came from the API
    pub fn api_code(&self) -> Option<&str> {
        match self {
            BridgeError::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Whether the error means "the entity does not exist"
    pub fn is_not_found(&self) -> bool {
        match self {
            BridgeError::NotFound { .. } => true,
            BridgeError::Api { status, code, .. } => {
                *status == 404 || code == "not_found" || code == "file_not_present"
            }
            _ => false,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BridgeError>;
