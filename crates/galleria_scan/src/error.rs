//! Error types for scan coordination

use std::io;
use thiserror::Error;

/// Scan coordination error type
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Scan controller is not running")]
    NotRunning,

    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ScanError>;
