//! JSON browsing of repository contents under `/api`.

use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::lookup::{LookupEngine, READ_PERMISSIONS, latest_version_dir};
use depot_core::View;
use depot_metadata::compare_versions;
use depot_storage::{FileDetails, StorageError, is_marker};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

/// Kind of a browsed entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// A file or directory as returned by the browse API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub content_length: u64,
}

impl FileEntry {
    fn directory(name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Directory,
            name: name.into(),
            content_type: None,
            content_length: 0,
        }
    }
}

impl From<FileDetails> for FileEntry {
    fn from(details: FileDetails) -> Self {
        Self {
            kind: EntryKind::File,
            name: details.name,
            content_type: Some(details.content_type),
            content_length: details.content_length,
        }
    }
}

/// Browse API response: a single entry or a directory listing.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Listing {
    Entry(FileEntry),
    Files { files: Vec<FileEntry> },
}

impl LookupEngine {
    /// Describe the requested path as JSON-friendly entries.
    ///
    /// The root lists the repositories visible to the caller. Repositories
    /// that are hidden or not browseable require a session scoped to the path.
    pub async fn browse(&self, ctx: &RequestContext) -> ApiResult<Listing> {
        info!("API {} from {}", ctx.uri(), ctx.address());

        if ctx.sanitized().is_empty() || ctx.uri().trim_end_matches('/') == "/api" {
            return self.browse_root(ctx);
        }

        let repository = match ctx.view() {
            View::Explicit => ctx.repositories().first(),
            _ => None,
        }
        .ok_or_else(|| ApiError::NotFound(format!("Can not find repo at: {}", ctx.sanitized())))?;

        if !repository.is_browseable() || repository.is_hidden() {
            let session = ctx
                .session()
                .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".to_string()))?;
            if !session.has_permission_to(ctx.sanitized())
                || !session.has_any_permission(&READ_PERMISSIONS)
            {
                return Err(ApiError::Unauthorized("Unauthorized request".to_string()));
            }
        }

        let filepath = ctx.filepath();
        if is_marker(filepath) {
            return Err(ApiError::NotFound("File not found".to_string()));
        }
        let path = repository.file(filepath);

        if path.file_name().is_some_and(|name| name == "latest") {
            let parent = filepath.rsplit_once('/').map_or("", |(parent, _)| parent);
            if let Some(version) = latest_version_dir(&repository.file(parent)).await? {
                return Ok(Listing::Entry(FileEntry::directory(version)));
            }
        }

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                Ok(Listing::Entry(FileDetails::from_path(&path).await?.into()))
            }
            Ok(_) => Ok(Listing::Files {
                files: list_directory(&path).await?,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ApiError::NotFound("File not found".to_string()))
            }
            Err(e) => Err(StorageError::Io(e).into()),
        }
    }

    fn browse_root(&self, ctx: &RequestContext) -> ApiResult<Listing> {
        let session = ctx.session();
        let repositories = self.registry.repositories();

        let files: Vec<FileEntry> = repositories
            .iter()
            .filter(|r| {
                (r.is_browseable() && !r.is_hidden())
                    || session.is_some_and(|s| s.repositories().iter().any(|n| n == r.name()))
            })
            .map(|r| FileEntry::directory(r.name()))
            .collect();

        if session.is_none() && files.is_empty() && !repositories.is_empty() {
            return Err(ApiError::Unauthorized("Unauthorized request".to_string()));
        }
        Ok(Listing::Files { files })
    }
}

/// Directory contents: directories first, newest version first, then files by
/// name. In-flight lock markers are skipped.
async fn list_directory(dir: &Path) -> ApiResult<Vec<FileEntry>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(StorageError::Io)?;
    let mut directories = Vec::new();
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(StorageError::Io)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_marker(&name) {
            continue;
        }
        let metadata = entry.metadata().await.map_err(StorageError::Io)?;
        if metadata.is_dir() {
            directories.push(FileEntry::directory(name));
        } else {
            files.push(FileEntry::from(FileDetails::new(
                name.as_str(),
                depot_storage::content_type_for(&name),
                metadata.len(),
            )));
        }
    }

    directories.sort_by(|a, b| compare_versions(&b.name, &a.name));
    files.sort_by(|a, b| a.name.cmp(&b.name));
    directories.append(&mut files);
    Ok(directories)
}
