//! Error types for contain-domains

use thiserror::Error;

/// Errors that can occur while enforcing containment
#[derive(Debug, Error)]
pub enum ContainError {
    /// A host browser operation failed (tab, cookie or container API)
    #[error("Host error: {0}")]
    Host(String),

    /// The dedicated container could not be found or created
    #[error("Failed to set up container '{name}': {reason}")]
    ContextSetup {
        name: String,
        reason: String,
    },

    /// The assignment collaborator rejected or failed a request
    #[error("Collaborator '{id}' error: {reason}")]
    Collaborator {
        id: String,
        reason: String,
    },

    /// A URL could not be parsed
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
    },

    /// A domain in the domain set could not be compiled into a matcher
    #[error("Invalid domain '{0}'")]
    InvalidDomain(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for containment operations
pub type Result<T> = std::result::Result<T, ContainError>;
