//! Crash-consistent artifact writes guarded by a sibling `.lock` marker.
//!
//! A write creates `<target>.lock` exclusively, moves any existing target onto
//! it, streams the new content into the marker and renames it over the
//! target. A crash mid-copy leaves only the marker behind. A writer that
//! finds the marker already present backs off and is resubmitted later by
//! the [`DelayScheduler`].

use crate::details::FileDetails;
use crate::error::{StorageError, StorageResult};
use crate::scheduler::DelayScheduler;
use depot_core::Repository;
use depot_core::config::WriterConfig;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

/// Suffix of the marker file.
pub const LOCK_SUFFIX: &str = ".lock";

/// Byte source consumed by a store.
pub type ByteSource = Pin<Box<dyn AsyncRead + Send>>;

/// Marker path for a target file.
pub fn marker_path(target: &Path) -> PathBuf {
    let mut marker = target.as_os_str().to_os_string();
    marker.push(LOCK_SUFFIX);
    PathBuf::from(marker)
}

/// True if `path` names a lock marker rather than an artifact.
pub fn is_marker(path: &str) -> bool {
    path.ends_with(LOCK_SUFFIX)
}

struct StoreTask {
    source: ByteSource,
    repository: Arc<Repository>,
    path: String,
    attempts: u32,
    reply: oneshot::Sender<StorageResult<FileDetails>>,
}

/// Awaitable result of a submitted store.
///
/// Dropping the handle does not cancel the store.
#[must_use = "a store handle does nothing unless awaited"]
pub struct StoreHandle {
    receiver: oneshot::Receiver<StorageResult<FileDetails>>,
}

impl Future for StoreHandle {
    type Output = StorageResult<FileDetails>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(StorageError::Cancelled)))
    }
}

/// Writes artifacts into repositories.
#[derive(Clone, Debug)]
pub struct StorageWriter {
    scheduler: DelayScheduler,
    retry_delay: Duration,
    max_retries: Option<u32>,
}

impl StorageWriter {
    /// Create a writer with its own delay scheduler. Must be called from
    /// within a tokio runtime.
    pub fn new(retry_delay: Duration, max_retries: Option<u32>) -> Self {
        Self {
            scheduler: DelayScheduler::spawn(),
            retry_delay,
            max_retries,
        }
    }

    pub fn from_config(config: &WriterConfig) -> Self {
        Self::new(config.retry_delay(), config.max_lock_retries)
    }

    /// Submit a store of `source` to `path` inside `repository`.
    ///
    /// The write runs on its own task; the returned handle resolves once the
    /// final rename has happened or the write failed.
    pub fn store(
        &self,
        source: ByteSource,
        repository: Arc<Repository>,
        path: impl Into<String>,
    ) -> StoreHandle {
        let (reply, receiver) = oneshot::channel();
        self.submit(StoreTask {
            source,
            repository,
            path: path.into(),
            attempts: 0,
            reply,
        });
        StoreHandle { receiver }
    }

    fn submit(&self, task: StoreTask) {
        let writer = self.clone();
        tokio::spawn(async move { writer.run(task).await });
    }

    #[instrument(skip_all, fields(repository = %task.repository.name(), path = %task.path))]
    async fn run(&self, mut task: StoreTask) {
        if is_marker(&task.path) {
            let _ = task
                .reply
                .send(Err(StorageError::InvalidPath(task.path.clone())));
            return;
        }

        let target = task.repository.file(&task.path);
        let marker = marker_path(&target);

        match acquire(&target, &marker).await {
            Ok(true) => {
                let result = write(&mut task, &target, &marker).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Store failed");
                    if let Err(e) = fs::remove_file(&marker).await
                        && e.kind() != std::io::ErrorKind::NotFound
                    {
                        warn!(error = %e, marker = %marker.display(), "Failed to remove lock marker");
                    }
                }
                let _ = task.reply.send(result);
            }
            Ok(false) => self.retry_later(task, marker),
            Err(e) => {
                let _ = task.reply.send(Err(e));
            }
        }
    }

    fn retry_later(&self, mut task: StoreTask, marker: PathBuf) {
        task.attempts += 1;

        if let Some(max) = self.max_retries
            && task.attempts > max
        {
            let _ = task.reply.send(Err(StorageError::LockContention {
                path: marker,
                attempts: task.attempts,
            }));
            return;
        }

        debug!(
            attempts = task.attempts,
            delay_ms = self.retry_delay.as_millis() as u64,
            "Target is locked, retrying later"
        );

        let writer = self.clone();
        let scheduled = self
            .scheduler
            .schedule(self.retry_delay, move || writer.submit(task));
        if !scheduled {
            warn!("Delay scheduler is gone, store abandoned");
        }
    }
}

/// Create the marker exclusively. Returns false if another writer holds it.
async fn acquire(target: &Path, marker: &Path) -> StorageResult<bool> {
    if fs::metadata(target).await.is_ok_and(|m| m.is_dir()) {
        return Err(StorageError::IsDirectory(target.to_path_buf()));
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }

    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(marker)
        .await
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StorageError::Io(e)),
    }
}

async fn write(task: &mut StoreTask, target: &Path, marker: &Path) -> StorageResult<FileDetails> {
    if fs::try_exists(target).await? {
        fs::rename(target, marker).await?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(marker)
        .await?;
    let written = tokio::io::copy(&mut task.source, &mut file).await?;
    file.sync_all().await?;
    drop(file);

    // Overwrites add the full new size without releasing the old one.
    task.repository.quota().allocate(written);

    fs::rename(marker, target).await?;
    debug!(bytes = written, "Stored");

    FileDetails::from_path(target).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::QuotaNode;
    use depot_core::config::RepositoryConfig;

    fn repository(root: &Path) -> Arc<Repository> {
        let config = RepositoryConfig::new("main");
        Arc::new(Repository::from_config(&config, root, &QuotaNode::unlimited()).unwrap())
    }

    fn source(data: &'static [u8]) -> ByteSource {
        Box::pin(data)
    }

    #[test]
    fn test_marker_path() {
        assert_eq!(
            marker_path(Path::new("/repo/g/a/1.0/a-1.0.jar")),
            PathBuf::from("/repo/g/a/1.0/a-1.0.jar.lock")
        );
    }

    #[tokio::test]
    async fn test_store_creates_parents_and_allocates() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let writer = StorageWriter::new(Duration::from_millis(10), None);

        let details = writer
            .store(source(b"hello"), Arc::clone(&repo), "g/a/1.0/a-1.0.jar")
            .await
            .unwrap();

        assert_eq!(details.name, "a-1.0.jar");
        assert_eq!(details.content_length, 5);
        assert_eq!(tokio::fs::read(repo.file("g/a/1.0/a-1.0.jar")).await.unwrap(), b"hello");
        assert!(!marker_path(&repo.file("g/a/1.0/a-1.0.jar")).exists());
        assert_eq!(repo.quota().usage(), 5);
        assert_eq!(repo.quota().parent().unwrap().usage(), 5);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content_and_drifts_quota() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let writer = StorageWriter::new(Duration::from_millis(10), None);

        writer.store(source(b"first version"), Arc::clone(&repo), "a.txt").await.unwrap();
        writer.store(source(b"second"), Arc::clone(&repo), "a.txt").await.unwrap();

        assert_eq!(tokio::fs::read(repo.file("a.txt")).await.unwrap(), b"second");
        assert_eq!(repo.quota().usage(), 13 + 6);
    }

    #[tokio::test]
    async fn test_directory_target_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        tokio::fs::create_dir_all(repo.file("g/a")).await.unwrap();
        let writer = StorageWriter::new(Duration::from_millis(10), None);

        let result = writer.store(source(b"x"), Arc::clone(&repo), "g/a").await;

        assert!(matches!(result, Err(StorageError::IsDirectory(_))));
        assert_eq!(repo.quota().usage(), 0);
    }

    #[tokio::test]
    async fn test_waits_for_marker_to_disappear() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let target = repo.file("g/a/1.0/a-1.0.jar");
        tokio::fs::create_dir_all(target.parent().unwrap()).await.unwrap();
        tokio::fs::write(marker_path(&target), b"").await.unwrap();

        let writer = StorageWriter::new(Duration::from_millis(20), None);
        let handle = writer.store(source(b"payload"), Arc::clone(&repo), "g/a/1.0/a-1.0.jar");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!target.exists(), "write must not happen while the marker exists");

        tokio::fs::remove_file(marker_path(&target)).await.unwrap();
        handle.await.unwrap();

        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_bounded_retries_give_up() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let target = repo.file("a.txt");
        tokio::fs::create_dir_all(repo.root()).await.unwrap();
        tokio::fs::write(marker_path(&target), b"").await.unwrap();

        let writer = StorageWriter::new(Duration::from_millis(5), Some(2));
        let result = writer.store(source(b"x"), Arc::clone(&repo), "a.txt").await;

        match result {
            Err(StorageError::LockContention { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected lock contention, got {other:?}"),
        }
        assert!(marker_path(&target).exists(), "foreign marker must be left alone");
    }

    #[tokio::test]
    async fn test_marker_names_are_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let writer = StorageWriter::new(Duration::from_millis(5), Some(0));

        let result = writer.store(source(b"x"), Arc::clone(&repo), "a.txt.lock").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
        assert!(!repo.file("a.txt.lock").exists());

        writer.store(source(b"ok"), Arc::clone(&repo), "a.txt").await.unwrap();
        assert_eq!(tokio::fs::read(repo.file("a.txt")).await.unwrap(), b"ok");
    }
}
