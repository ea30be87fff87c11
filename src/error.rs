//! WolfDrive Error Types

use thiserror::Error;

/// Result type alias for WolfDrive operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfDrive error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Request errors
    #[error("{0}")]
    Validation(String),

    // Authentication errors
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Storage connection failed: {0}")]
    Connection(String),

    #[error("Storage connection timed out after {0}s")]
    ConnectionTimeout(u64),

    // Node graph errors
    #[error("{0} not found")]
    NotFound(String),

    #[error("Node {0} is not a folder")]
    NotAFolder(String),

    #[error("Node {0} is not a file")]
    NotAFile(String),

    // Backend errors
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Transfer timed out after {0}s")]
    TransferTimeout(u64),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error should be reported to the client as an authentication failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::InvalidCredentials
                | Error::Unauthorized
                | Error::Connection(_)
                | Error::ConnectionTimeout(_)
        )
    }

    /// Check if this error originated in the storage backend
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Error::Backend(_) | Error::TransferTimeout(_))
    }
}
