//! Artifact storage for depot.
//!
//! This crate provides:
//! - Crash-consistent writes guarded by a `.lock` marker file
//! - A single-worker delay scheduler for contended writes
//! - File details and content type detection

pub mod details;
pub mod error;
pub mod scheduler;
pub mod writer;

pub use details::{FileDetails, content_type_for};
pub use error::{StorageError, StorageResult};
pub use scheduler::DelayScheduler;
pub use writer::{ByteSource, LOCK_SUFFIX, StorageWriter, StoreHandle, is_marker, marker_path};
