//! Error types for path construction and lookup.

use thiserror::Error;

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur building or querying paths.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A path needs at least one segment
    #[error("path has no segments")]
    EmptyPath,

    /// Path data could not be read
    #[error("malformed path data at token {position}: {reason}")]
    Malformed { position: usize, reason: String },

    /// Path data uses a command this parser does not draw
    #[error("unsupported path command '{0}'")]
    UnsupportedCommand(char),

    /// No curve registered under this name
    #[error("unknown path: {0}")]
    UnknownPath(String),
}
