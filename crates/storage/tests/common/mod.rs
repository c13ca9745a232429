use depot_core::config::RepositoryConfig;
use depot_core::{QuotaNode, Repository};
use depot_storage::ByteSource;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Create a repository named `name` under `root` with an unlimited quota.
#[allow(dead_code)]
pub fn repository(root: &Path, name: &str) -> Arc<Repository> {
    let config = RepositoryConfig::new(name);
    let repository = Repository::from_config(&config, root, &QuotaNode::unlimited()).unwrap();
    repository.load().unwrap();
    Arc::new(repository)
}

/// A byte source that delivers `data` in `chunks` pieces with `delay` between them.
#[allow(dead_code)]
pub fn slow_source(data: Vec<u8>, chunks: usize, delay: Duration) -> ByteSource {
    let (mut writer, reader) = tokio::io::duplex(1024);
    let chunk_size = data.len().div_ceil(chunks.max(1)).max(1);

    tokio::spawn(async move {
        for chunk in data.chunks(chunk_size) {
            if writer.write_all(chunk).await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
        }
        let _ = writer.shutdown().await;
    });

    Box::pin(reader)
}

/// True if every byte equals the first one.
#[allow(dead_code)]
pub fn is_uniform(data: &[u8]) -> bool {
    data.windows(2).all(|w| w[0] == w[1])
}
