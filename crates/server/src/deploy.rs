//! Artifact deployment.

use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use depot_core::{METADATA_FILE, Permission, Repository, View};
use depot_metadata::MetadataCache;
use depot_storage::{FileDetails, StorageResult, StorageWriter, StoreHandle, is_marker};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Validates uploads and submits them to the storage writer.
pub struct DeployEngine {
    writer: StorageWriter,
    cache: Arc<MetadataCache>,
}

/// An accepted deployment whose write may still be running.
#[must_use = "a deploy task should be awaited"]
pub struct DeployTask {
    handle: StoreHandle,
    cache: Arc<MetadataCache>,
    metadata: PathBuf,
}

impl DeployTask {
    /// Wait for the write to finish.
    ///
    /// The sibling metadata entry is invalidated again once the file is in
    /// place, so a lookup that raced the write cannot keep stale bytes.
    pub async fn wait(self) -> StorageResult<FileDetails> {
        let result = self.handle.await;
        self.cache.invalidate(&self.metadata);
        result
    }
}

impl DeployEngine {
    pub fn new(writer: StorageWriter, cache: Arc<MetadataCache>) -> Self {
        Self { writer, cache }
    }

    /// Accept an upload and submit its body for storage.
    pub fn deploy(&self, ctx: &RequestContext) -> ApiResult<DeployTask> {
        let filepath = ctx.filepath().trim_start_matches('/');
        if filepath.is_empty() {
            return Err(ApiError::BadRequest("Invalid GAV path".to_string()));
        }
        if is_marker(filepath) {
            return Err(ApiError::BadRequest(format!(
                "Lock marker can not be deployed: {filepath}"
            )));
        }

        let repository = self.target(ctx, filepath)?;

        if repository.is_read_only() {
            return Err(ApiError::MethodNotAllowed(
                "Artifact deployment is disabled".to_string(),
            ));
        }

        if !repository.can_contain(filepath) {
            return Err(ApiError::MethodNotAllowed(format!(
                "Repository {} can not contain: {}",
                repository.name(),
                filepath
            )));
        }

        let session = ctx
            .session_for(&format!("{}/{}", repository.name(), filepath))
            .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".to_string()))?;

        if !session.has_permission(Permission::Write) {
            return Err(ApiError::Unauthorized(
                "Cannot deploy artifact without write permission".to_string(),
            ));
        }

        if !repository.quota().has_space() {
            return Err(ApiError::InsufficientStorage("Out of disk space".to_string()));
        }

        let source = ctx
            .take_input()
            .ok_or_else(|| ApiError::BadRequest("Missing request body".to_string()))?;

        let target = repository.file(filepath);
        let metadata = target
            .parent()
            .map(|parent| parent.join(METADATA_FILE))
            .unwrap_or_else(|| repository.file(METADATA_FILE));
        self.cache.invalidate(&metadata);

        info!(
            "DEPLOY {} successfully deployed {} from {}",
            session.alias(),
            target.display(),
            ctx.address()
        );

        let handle = self
            .writer
            .store(source, Arc::clone(repository), filepath);
        Ok(DeployTask {
            handle,
            cache: Arc::clone(&self.cache),
            metadata,
        })
    }

    fn target<'a>(
        &self,
        ctx: &'a RequestContext,
        filepath: &str,
    ) -> ApiResult<&'a Arc<Repository>> {
        let repository = match ctx.view() {
            View::Explicit => ctx.repositories().first(),
            View::Releases | View::Snapshots => {
                ctx.repositories().iter().find(|r| r.can_contain(filepath))
            }
            View::All => {
                return Err(ApiError::MethodNotAllowed(
                    "Deploying to unknown endpoint. Must be a explicit repo, '/releases', or '/snapshots'"
                        .to_string(),
                ));
            }
        };

        repository.ok_or_else(|| ApiError::NotFound(format!("Can not find repo at: {}", ctx.uri())))
    }
}
