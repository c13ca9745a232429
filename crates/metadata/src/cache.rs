//! Cache of merged `maven-metadata.xml` documents.
//!
//! Every entry remembers the absolute paths of all candidate documents it was
//! computed from, whether or not they existed at the time. A write to any of
//! those paths invalidates the entry.
//!
//! Invalidation also bumps a per-path generation. A merge snapshots the
//! generations of its inputs before reading them and drops its result if any
//! changed, so a write that lands mid-merge is never masked by stale bytes.

use crate::error::{MetadataError, MetadataResult};
use crate::models::Metadata;
use bytes::Bytes;
use dashmap::DashMap;
use depot_core::{METADATA_FILE, Repository};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct CacheEntry {
    data: Bytes,
    inputs: Vec<PathBuf>,
}

/// Concurrent cache of merged metadata, keyed by view and path.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: DashMap<String, Arc<CacheEntry>>,
    dependents: DashMap<PathBuf, HashSet<String>>,
    generations: DashMap<PathBuf, u64>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a metadata path resolved over `repositories`.
    pub fn key(repositories: &[Arc<Repository>], filepath: &str) -> String {
        let names: Vec<_> = repositories.iter().map(|r| r.name()).collect();
        format!("{}:{}", names.join(","), filepath.trim_start_matches('/'))
    }

    /// Merged metadata for `filepath` across `repositories`.
    ///
    /// Returns `None` when no repository holds the document. A single document
    /// is returned byte for byte; several are parsed and merged in repository
    /// order.
    pub async fn merge(
        &self,
        key: &str,
        filepath: &str,
        repositories: &[Arc<Repository>],
    ) -> MetadataResult<Option<Bytes>> {
        if !is_metadata_path(filepath) {
            return Err(MetadataError::InvalidPath(filepath.to_string()));
        }

        if let Some(entry) = self.entries.get(key) {
            return Ok(Some(entry.data.clone()));
        }

        let inputs: Vec<PathBuf> = repositories.iter().map(|r| r.file(filepath)).collect();
        let seen = self.generations(&inputs);
        let mut existing = Vec::new();
        for input in &inputs {
            if tokio::fs::metadata(input).await.is_ok_and(|m| m.is_file()) {
                existing.push(input.as_path());
            }
        }

        let data = match existing.as_slice() {
            [] => return Ok(None),
            [single] => Bytes::from(tokio::fs::read(single).await?),
            several => {
                let mut merged: Option<Metadata> = None;
                for path in several {
                    let xml = tokio::fs::read_to_string(path).await?;
                    let document = Metadata::from_xml(&xml).map_err(|e| match e {
                        MetadataError::Document(source) => MetadataError::Parse {
                            path: path.to_path_buf(),
                            source,
                        },
                        other => other,
                    })?;
                    match merged.as_mut() {
                        Some(merged) => {
                            merged.merge(&document);
                        }
                        None => merged = Some(document),
                    }
                }
                let merged = merged.unwrap_or_default();
                Bytes::from(merged.to_xml()?)
            }
        };

        let sources = existing.len();
        if self.insert(key, data.clone(), inputs, &seen) {
            debug!(key, sources, "Metadata cached");
        }
        Ok(Some(data))
    }

    fn generations(&self, inputs: &[PathBuf]) -> Vec<u64> {
        inputs
            .iter()
            .map(|input| self.generations.get(input).map_or(0, |g| *g))
            .collect()
    }

    /// Publish an entry, then withdraw it if an input was invalidated since
    /// `seen` was taken. Returns true if the entry stays.
    fn insert(&self, key: &str, data: Bytes, inputs: Vec<PathBuf>, seen: &[u64]) -> bool {
        let entry = Arc::new(CacheEntry { data, inputs });
        for input in &entry.inputs {
            self.dependents
                .entry(input.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.entries.insert(key.to_string(), Arc::clone(&entry));

        // An invalidation after this check finds the entry and removes it
        if self.generations(&entry.inputs) != seen {
            self.evict(key);
            debug!(key, "Metadata changed while merging, not cached");
            return false;
        }
        true
    }

    fn evict(&self, key: &str) -> bool {
        let Some((_, entry)) = self.entries.remove(key) else {
            return false;
        };
        for input in &entry.inputs {
            if let Some(mut dependents) = self.dependents.get_mut(input) {
                dependents.remove(key);
            }
            self.dependents
                .remove_if(input, |_, dependents| dependents.is_empty());
        }
        true
    }

    /// Drop every entry computed from `path`. Returns the number removed.
    pub fn invalidate(&self, path: &Path) -> usize {
        *self.generations.entry(path.to_path_buf()).or_insert(0) += 1;

        let Some((_, keys)) = self.dependents.remove(path) else {
            return 0;
        };

        let removed = keys.iter().filter(|key| self.evict(key)).count();

        if removed > 0 {
            debug!(path = %path.display(), removed, "Metadata invalidated");
        }
        removed
    }

    /// Drop every entry. Returns the number of entries dropped.
    pub fn purge(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.dependents.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True if the last path segment is the metadata document name.
pub fn is_metadata_path(filepath: &str) -> bool {
    filepath.rsplit('/').next() == Some(METADATA_FILE)
}
