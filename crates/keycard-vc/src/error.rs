//! Credential error types.

use thiserror::Error;

/// Credential processing errors.
#[derive(Debug, Error)]
pub enum VcError {
    #[error("invalid credential format: {0}")]
    InvalidFormat(String),

    #[error("key resolution failed: {0}")]
    KeyResolution(String),
}

/// Result type for credential operations.
pub type VcResult<T> = std::result::Result<T, VcError>;
