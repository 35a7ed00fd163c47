//! Error types for callpop.

use thiserror::Error;

use crate::ami::AmiError;
use crate::config::ConfigError;
use crate::dispatch::DispatchError;

/// Errors that can occur during daemon operation.
#[derive(Error, Debug)]
pub enum CallpopError {
    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// AMI connection or protocol failure.
    #[error("AMI error: {0}")]
    Ami(#[from] AmiError),

    /// Screen-pop dispatch failure.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for callpop operations.
pub type Result<T> = std::result::Result<T, CallpopError>;
