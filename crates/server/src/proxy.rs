//! Remote mirror fetching.

use crate::context::{RequestContext, ResponseBody};
use crate::error::{ApiError, ApiResult};
use crate::failure::FailureLedger;
use axum::http::header::CONTENT_TYPE;
use depot_core::Repository;
use depot_core::config::ProxyConfig;
use depot_storage::details::DEFAULT_CONTENT_TYPE;
use depot_storage::{FileDetails, StorageWriter, is_marker};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};

const NOT_FOUND: &str = "Artifact not found in local and remote repository";

/// Fetches missing artifacts from a repository's remote mirrors and caches
/// them locally.
#[derive(Clone)]
pub struct ProxyFetcher {
    client: reqwest::Client,
    writer: StorageWriter,
    failures: Arc<FailureLedger>,
}

impl ProxyFetcher {
    pub fn new(
        config: &ProxyConfig,
        writer: StorageWriter,
        failures: Arc<FailureLedger>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            writer,
            failures,
        })
    }

    /// Resolve the request's file from the mirrors of `repository`.
    ///
    /// Mirrors are tried in declared order. The network work runs on its own
    /// task; this call waits for it. On GET the fetched file is stored and the
    /// response body points at the stored copy.
    pub async fn fetch(
        &self,
        ctx: &RequestContext,
        repository: &Arc<Repository>,
    ) -> ApiResult<FileDetails> {
        let filepath = ctx.filepath().trim_start_matches('/').to_string();
        if filepath.split('/').filter(|s| !s.is_empty()).count() < 2 {
            return Err(ApiError::NotFound("Invalid proxied request".to_string()));
        }
        if is_marker(&filepath) {
            return Err(ApiError::NotFound(NOT_FOUND.to_string()));
        }

        let head = ctx.is_head();
        let task = tokio::spawn({
            let fetcher = self.clone();
            let repository = Arc::clone(repository);
            let filepath = filepath.clone();
            async move { fetcher.fetch_from_mirrors(head, repository, filepath).await }
        });

        let details = match task.await {
            Ok(result) => result?,
            Err(e) => {
                self.failures.record(&filepath, &e);
                return Err(ApiError::NotFound(
                    "Error while resolving proxied artifact".to_string(),
                ));
            }
        };

        if !head {
            ctx.set_output(ResponseBody::File(repository.file(&filepath)));
        }
        Ok(details)
    }

    async fn fetch_from_mirrors(
        &self,
        head: bool,
        repository: Arc<Repository>,
        filepath: String,
    ) -> ApiResult<FileDetails> {
        for mirror in repository.proxies() {
            let url = format!("{mirror}{filepath}");

            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    self.mirror_unavailable(mirror, &filepath, e);
                    continue;
                }
            };

            if !response.status().is_success() {
                debug!(url = %url, status = %response.status(), "Mirror miss");
                continue;
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            // Directory listings and error pages
            if content_type
                .as_deref()
                .and_then(|ct| ct.split(';').next())
                .is_some_and(|media| media.trim().eq_ignore_ascii_case("text/html"))
            {
                debug!(url = %url, "Mirror returned an HTML page, skipping");
                continue;
            }

            if head {
                let name = filepath.rsplit('/').next().unwrap_or_default();
                return Ok(FileDetails::new(
                    name,
                    content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                    response.content_length().unwrap_or(0),
                ));
            }

            return self.store(&repository, &filepath, &url, response).await;
        }

        Err(ApiError::NotFound(NOT_FOUND.to_string()))
    }

    async fn store(
        &self,
        repository: &Arc<Repository>,
        filepath: &str,
        url: &str,
        response: reqwest::Response,
    ) -> ApiResult<FileDetails> {
        if !repository.quota().has_space() {
            warn!(
                repository = %repository.name(),
                path = %filepath,
                "Out of disk space, cannot store proxied artifact"
            );
            return Err(ApiError::NotFound(NOT_FOUND.to_string()));
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let source = Box::pin(StreamReader::new(stream));
        let details = self
            .writer
            .store(source, Arc::clone(repository), filepath)
            .await?;

        info!(
            "Stored proxied {} in {} from {}",
            filepath,
            repository.name(),
            url
        );
        Ok(details)
    }

    fn mirror_unavailable(&self, mirror: &str, filepath: &str, e: reqwest::Error) {
        if e.is_timeout() {
            warn!(mirror = %mirror, path = %filepath, "Proxied repository timed out");
            return;
        }

        error!(mirror = %mirror, path = %filepath, error = %e, "Proxied repository is unavailable");
        self.failures.record(filepath, &e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenAuthenticator;
    use axum::http::{HeaderMap, Method};
    use depot_core::RepositoryRegistry;
    use depot_core::config::{AppConfig, RepositoryConfig};
    use std::time::Duration;

    fn fetcher(failures: Arc<FailureLedger>) -> ProxyFetcher {
        let writer = StorageWriter::new(Duration::from_millis(50), None);
        ProxyFetcher::new(&ProxyConfig::default(), writer, failures).unwrap()
    }

    #[tokio::test]
    async fn test_shallow_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut main = RepositoryConfig::new("main");
        main.proxies = vec!["http://127.0.0.1:9/".to_string()];
        let config = AppConfig {
            repositories: vec![main],
            ..AppConfig::for_testing(dir.path())
        };
        let registry = RepositoryRegistry::from_config(&config).unwrap();
        let authenticator = Arc::new(TokenAuthenticator::new(&[], &registry));
        let ctx = RequestContext::create(
            &registry,
            authenticator,
            Method::GET,
            "/main/lib.jar",
            HeaderMap::new(),
            "127.0.0.1",
            None,
        )
        .unwrap();

        let failures = Arc::new(FailureLedger::new());
        let result = fetcher(failures.clone())
            .fetch(&ctx, &registry.repositories()[0])
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(m)) if m == "Invalid proxied request"));
        assert!(!failures.has_failures());
    }
}
