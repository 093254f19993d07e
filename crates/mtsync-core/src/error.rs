//! Error types for the sync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the sync system
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected by validation (e.g. an unsafe interface name)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IP range source unreachable or returned an unusable payload
    #[error("Upstream error ({source_name}): {message}")]
    Upstream {
        /// Source name
        source_name: String,
        /// Error message
        message: String,
    },

    /// Router store call failed
    #[error("Router store error ({store}): {message}")]
    Store {
        /// Store name
        store: String,
        /// Error message
        message: String,
    },

    /// Local interface query failed
    #[error("Local address source error: {0}")]
    LocalSource(String),

    /// Router rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An external call did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an upstream source error
    pub fn upstream(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a router store error
    pub fn store(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create a local address source error
    pub fn local_source(msg: impl Into<String>) -> Self {
        Self::LocalSource(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error means the transport to the router is no longer usable
    ///
    /// Store implementations use this to decide whether to drop their session.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
