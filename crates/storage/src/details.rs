//! File details reported for resolved and stored artifacts.

use crate::error::{StorageError, StorageResult};
use std::path::Path;

/// Content type used when the extension is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Name, content type and length of a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDetails {
    pub name: String,
    pub content_type: String,
    pub content_length: u64,
}

impl FileDetails {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, content_length: u64) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            content_length,
        }
    }

    /// Read details of an existing regular file.
    pub async fn from_path(path: &Path) -> StorageResult<Self> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.display().to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        if metadata.is_dir() {
            return Err(StorageError::IsDirectory(path.to_path_buf()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;

        Ok(Self {
            content_type: content_type_for(&name).to_string(),
            name,
            content_length: metadata.len(),
        })
    }
}

/// Guess a content type from a file name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xml" | "pom" => "text/xml",
        "jar" | "war" | "ear" => "application/java-archive",
        "sha1" | "sha256" | "sha512" | "md5" | "asc" | "txt" => "text/plain",
        "json" | "module" => "application/json",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "html" | "htm" => "text/html",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
