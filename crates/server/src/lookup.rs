//! Artifact resolution across repositories.

use crate::context::{RequestContext, ResponseBody};
use crate::error::{ApiError, ApiResult};
use crate::failure::FailureLedger;
use crate::proxy::ProxyFetcher;
use bytes::Bytes;
use depot_core::{Permission, Repository, RepositoryRegistry, View};
use depot_metadata::{MetadataCache, is_metadata_path, latest_version};
use depot_storage::{FileDetails, StorageError, is_marker};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub(crate) const READ_PERMISSIONS: [Permission; 3] =
    [Permission::Read, Permission::Write, Permission::Manager];

/// Resolves read requests against local storage, delegates, mirrors and the
/// merged metadata cache.
pub struct LookupEngine {
    pub(crate) registry: Arc<RepositoryRegistry>,
    cache: Arc<MetadataCache>,
    proxy: ProxyFetcher,
    failures: Arc<FailureLedger>,
}

impl LookupEngine {
    pub fn new(
        registry: Arc<RepositoryRegistry>,
        cache: Arc<MetadataCache>,
        proxy: ProxyFetcher,
        failures: Arc<FailureLedger>,
    ) -> Self {
        Self {
            registry,
            cache,
            proxy,
            failures,
        }
    }

    /// Resolve the requested file.
    ///
    /// On success the context output holds the body to send, unless the
    /// request is a HEAD.
    pub async fn resolve(&self, ctx: &RequestContext) -> ApiResult<FileDetails> {
        let filepath = ctx.filepath();
        if is_marker(filepath) {
            return Err(ApiError::NotFound(format!("Artifact {filepath} not found")));
        }

        let candidates = if ctx.view() == View::Explicit {
            let repository = ctx
                .repositories()
                .first()
                .ok_or_else(|| ApiError::NotFound("Repository not found".to_string()))?;
            if !is_visible(ctx, repository) {
                return Err(ApiError::Unauthorized("Unauthorized request".to_string()));
            }
            vec![Arc::clone(repository)]
        } else {
            // Invisible repositories are dropped silently
            ctx.repositories()
                .iter()
                .filter(|r| r.can_contain(filepath))
                .filter(|r| is_visible(ctx, r))
                .cloned()
                .collect()
        };

        if candidates.is_empty() {
            return Err(ApiError::NotFound(format!("Artifact {filepath} not found")));
        }

        if is_latest(filepath) {
            return self.resolve_latest(ctx, &candidates).await;
        }

        if candidates.len() > 1
            && is_metadata_path(filepath)
            && let Some(details) = self.merge_metadata(ctx, &candidates).await
        {
            return Ok(details);
        }

        self.resolve_cascade(ctx, &candidates).await
    }

    async fn merge_metadata(
        &self,
        ctx: &RequestContext,
        candidates: &[Arc<Repository>],
    ) -> Option<FileDetails> {
        let key = MetadataCache::key(candidates, ctx.filepath());
        match self.cache.merge(&key, ctx.filepath(), candidates).await {
            Ok(Some(data)) => {
                let details = FileDetails::new(
                    depot_core::METADATA_FILE,
                    "text/xml",
                    data.len() as u64,
                );
                if !ctx.is_head() {
                    ctx.set_output(ResponseBody::Bytes(data));
                }
                debug!(key = %key, "RESOLVED merged metadata");
                Some(details)
            }
            Ok(None) => None,
            Err(e) => {
                self.failures.record(ctx.uri(), &e);
                None
            }
        }
    }

    /// Walk the candidates in order, following delegates and mirrors.
    ///
    /// Every repository is consulted at most once, so cyclic delegate chains
    /// terminate.
    async fn resolve_cascade(
        &self,
        ctx: &RequestContext,
        candidates: &[Arc<Repository>],
    ) -> ApiResult<FileDetails> {
        let filepath = ctx.filepath();
        let mut visited: HashSet<String> = HashSet::new();
        let mut miss = ApiError::NotFound(format!("Artifact {filepath} not found"));
        let mut current = candidates.first().cloned();

        while let Some(repository) = current.take() {
            visited.insert(repository.name().to_string());

            if let Some(details) = self.resolve_local(ctx, &repository).await? {
                return Ok(details);
            }
            check_depth(filepath)?;

            if let Some(delegate) = repository.delegate()
                && !visited.contains(delegate)
                && let Some(target) = self.registry.get(delegate)
                && is_visible(ctx, target)
            {
                debug!(from = %repository.name(), to = %delegate, "Delegating lookup");
                current = Some(Arc::clone(target));
                continue;
            }

            if !repository.proxies().is_empty() {
                match self.proxy.fetch(ctx, &repository).await {
                    Ok(details) => return Ok(details),
                    Err(e @ ApiError::NotFound(_)) => miss = e,
                    Err(e) => return Err(e),
                }
            }

            current = candidates
                .iter()
                .find(|c| !visited.contains(c.name()))
                .cloned();
        }

        Err(miss)
    }

    async fn resolve_local(
        &self,
        ctx: &RequestContext,
        repository: &Repository,
    ) -> ApiResult<Option<FileDetails>> {
        let path = repository.file(ctx.filepath());

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => {
                Err(ApiError::DirectoryAccess("Directory access".to_string()))
            }
            Ok(_) => {
                let details = FileDetails::from_path(&path).await?;
                debug!(
                    "RESOLVED {}; mime: {}; size: {}",
                    path.display(),
                    details.content_type,
                    details.content_length
                );
                if !ctx.is_head() {
                    ctx.set_output(ResponseBody::File(path));
                }
                Ok(Some(details))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e).into()),
        }
    }

    async fn resolve_latest(
        &self,
        ctx: &RequestContext,
        candidates: &[Arc<Repository>],
    ) -> ApiResult<FileDetails> {
        let parent = ctx
            .filepath()
            .rsplit_once('/')
            .map_or("", |(parent, _)| parent);

        for repository in candidates {
            if let Some(version) = latest_version_dir(&repository.file(parent)).await? {
                let details = FileDetails::new("latest", "text/plain", version.len() as u64);
                if !ctx.is_head() {
                    ctx.set_output(ResponseBody::Bytes(Bytes::from(version)));
                }
                return Ok(details);
            }
        }

        Err(ApiError::NotFound("Latest version not found".to_string()))
    }
}

/// True if the caller may see `repository`. Hidden repositories need a
/// session scoped to the requested path.
pub(crate) fn is_visible(ctx: &RequestContext, repository: &Repository) -> bool {
    if !repository.is_hidden() {
        return true;
    }
    let path = format!("{}/{}", repository.name(), ctx.filepath());
    ctx.session_for(&path)
        .is_some_and(|session| session.has_any_permission(&READ_PERMISSIONS))
}

fn is_latest(filepath: &str) -> bool {
    filepath
        .rsplit('/')
        .next()
        .is_some_and(|name| name.eq_ignore_ascii_case("latest"))
}

fn depth(filepath: &str) -> usize {
    filepath.split('/').filter(|s| !s.is_empty()).count()
}

/// Metadata needs a group segment; artifacts need group, artifact, version
/// and file.
fn check_depth(filepath: &str) -> ApiResult<()> {
    let depth = depth(filepath);
    if is_metadata_path(filepath) {
        if depth < 2 {
            return Err(ApiError::NotFound("Missing group identifier".to_string()));
        }
    } else if depth < 4 {
        return Err(ApiError::BadRequest("invalid artifact path".to_string()));
    }
    Ok(())
}

/// Name of the highest version directory under `dir`.
pub(crate) async fn latest_version_dir(dir: &Path) -> ApiResult<Option<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            return Ok(None);
        }
        Err(e) => return Err(StorageError::Io(e).into()),
    };

    let mut versions = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(StorageError::Io)? {
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            versions.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    Ok(latest_version(versions.iter().map(String::as_str)).map(str::to_string))
}
