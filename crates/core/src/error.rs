//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid repository name: {0}")]
    InvalidRepositoryName(String),

    #[error("invalid disk quota: {0}")]
    InvalidQuota(String),

    #[error("invalid permissions: {0}")]
    InvalidPermissions(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
