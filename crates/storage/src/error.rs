//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("cannot lock directory: {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("{} is still locked after {attempts} attempts", .path.display())]
    LockContention { path: PathBuf, attempts: u32 },

    #[error("store task was dropped before completion")]
    Cancelled,
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
