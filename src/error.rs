//! Error types for clamd-filter

use thiserror::Error;

/// Main error type for clamd-filter
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection cleanly at a command boundary
    #[error("Connection closed")]
    Eof,

    /// Peer closed the connection in the middle of a command
    #[error("Incomplete command: connection closed after {received} bytes without delimiter")]
    IncompleteCommand { received: usize },

    /// Failed to read or forward a complete INSTREAM chunk
    #[error("Incomplete chunk: failed to {stage}: {source}")]
    IncompleteChunk {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration file '{}': {source}", .path.display())]
    TomlParse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Backend connection timed out: {0}")]
    BackendTimeout(String),

    #[error("Socket error: {0}")]
    Socket(String),
}

impl Error {
    /// The underlying I/O error, if this error wraps one
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            Error::Io(e) => Some(e),
            Error::IncompleteChunk { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
