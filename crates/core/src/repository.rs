//! Repository record and path policy.

use crate::config::RepositoryConfig;
use crate::quota::{Capacity, QuotaNode};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the generated Maven metadata document.
pub const METADATA_FILE: &str = "maven-metadata.xml";

/// Names reserved for the aggregate views.
const RESERVED_NAMES: [&str; 2] = ["releases", "snapshots"];

/// Validate a repository name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRepositoryName("name cannot be empty".into()));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(Error::InvalidRepositoryName(format!(
            "'{name}' is reserved"
        )));
    }
    if name.contains("..") {
        return Err(Error::InvalidRepositoryName(format!(
            "'{name}' contains '..'"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_ascii_uppercase() || matches!(c, '-' | '/' | '\\' | ':' | '~') || c.is_whitespace())
    {
        return Err(Error::InvalidRepositoryName(format!(
            "'{name}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}

/// A named storage root with its access policy.
#[derive(Debug)]
pub struct Repository {
    name: String,
    root: PathBuf,
    hidden: bool,
    read_only: bool,
    browseable: bool,
    prefixes: Vec<String>,
    proxies: Vec<String>,
    delegate: Option<String>,
    quota: Arc<QuotaNode>,
}

impl Repository {
    /// Build a repository under `storage_root`, chaining its quota to `global`.
    pub fn from_config(
        config: &RepositoryConfig,
        storage_root: &Path,
        global: &Arc<QuotaNode>,
    ) -> Result<Self> {
        validate_name(&config.name)?;
        let capacity = Capacity::parse(&config.disk_quota)?.resolve_for_parent(global);
        let root = std::path::absolute(storage_root.join(&config.name))?;

        Ok(Self {
            name: config.name.clone(),
            root,
            hidden: config.hidden,
            read_only: !config.allow_uploads,
            browseable: config.browseable,
            prefixes: config.normalized_prefixes(),
            proxies: config.normalized_proxies(),
            delegate: config.delegate().map(str::to_string),
            quota: QuotaNode::child(global, capacity),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute repository directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_browseable(&self) -> bool {
        self.browseable
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    pub fn delegate(&self) -> Option<&str> {
        self.delegate.as_deref()
    }

    pub fn quota(&self) -> &Arc<QuotaNode> {
        &self.quota
    }

    /// True if no prefixes are configured or `path` starts with one of them.
    pub fn can_contain(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Absolute location of a repository-relative path.
    pub fn file(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// True if a regular file exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.file(path).is_file()
    }

    /// Create the repository directory if needed and account its existing size.
    pub fn load(&self) -> Result<bool> {
        let created = if self.root.exists() {
            false
        } else {
            fs::create_dir_all(&self.root)?;
            true
        };

        self.quota.allocate(directory_size(&self.root)?);
        Ok(created)
    }
}

fn directory_size(dir: &Path) -> Result<u64> {
    let mut total = 0;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata()?.len();
            }
        }
    }

    Ok(total)
}
