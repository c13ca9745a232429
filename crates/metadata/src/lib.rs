//! Maven metadata handling for depot.
//!
//! This crate provides:
//! - The `maven-metadata.xml` document model with parsing and serialization
//! - Structural merging of documents from several repositories
//! - A concurrent cache of merged documents with per-file invalidation
//! - Maven-style version ordering

pub mod cache;
pub mod error;
pub mod models;
pub mod version;

pub use cache::{MetadataCache, is_metadata_path};
pub use error::{MetadataError, MetadataResult};
pub use models::{Metadata, Plugin, Snapshot, SnapshotVersion, Versioning};
pub use version::{compare_versions, latest_version};
