//! Error types for the dashboard core.

use thiserror::Error;

/// Result type for dashboard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while applying events or building views.
#[derive(Debug, Error)]
pub enum Error {
    /// Unparsable wire payload
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Event or message kind this dashboard does not handle
    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    /// Event names an agent that is not configured
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Required configuration entry is missing or invalid
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// Bus subscriber failed
    #[error("Handler failed: {0}")]
    Handler(String),

    /// Path geometry error
    #[error("Geometry error: {0}")]
    Geometry(#[from] switchboard_geometry::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
