//! Error types for the bridge.

use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid setting
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Unrecognized user command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Error from the dashboard core
    #[error(transparent)]
    Vis(#[from] switchboard_vis::Error),
}
