//! Application state shared across handlers.

use crate::auth::{Authenticator, TokenAuthenticator};
use crate::deploy::DeployEngine;
use crate::failure::FailureLedger;
use crate::lookup::LookupEngine;
use crate::proxy::ProxyFetcher;
use depot_core::RepositoryRegistry;
use depot_core::config::AppConfig;
use depot_metadata::MetadataCache;
use depot_storage::StorageWriter;
use std::sync::Arc;

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid repository configuration: {0}")]
    Registry(#[from] depot_core::Error),

    #[error("failed to build proxy client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Application state shared across handlers.
///
/// Every service is constructed once and shared by handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<RepositoryRegistry>,
    pub authenticator: Arc<dyn Authenticator>,
    pub metadata: Arc<MetadataCache>,
    pub failures: Arc<FailureLedger>,
    pub lookup: Arc<LookupEngine>,
    pub deploy: Arc<DeployEngine>,
}

impl AppState {
    /// Build the state from configuration. Repositories are not loaded; call
    /// [`RepositoryRegistry::load`] before serving.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: AppConfig) -> Result<Self, StateError> {
        let registry = Arc::new(RepositoryRegistry::from_config(&config)?);
        let authenticator: Arc<dyn Authenticator> =
            Arc::new(TokenAuthenticator::new(&config.tokens, &registry));
        Self::with_authenticator(config, registry, authenticator)
    }

    /// Build the state with a custom authenticator.
    pub fn with_authenticator(
        config: AppConfig,
        registry: Arc<RepositoryRegistry>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, StateError> {
        let metadata = Arc::new(MetadataCache::new());
        let failures = Arc::new(FailureLedger::new());
        let writer = StorageWriter::from_config(&config.writer);
        let proxy = ProxyFetcher::new(&config.proxy, writer.clone(), Arc::clone(&failures))?;

        let lookup = Arc::new(LookupEngine::new(
            Arc::clone(&registry),
            Arc::clone(&metadata),
            proxy,
            Arc::clone(&failures),
        ));
        let deploy = Arc::new(DeployEngine::new(writer, Arc::clone(&metadata)));

        Ok(Self {
            config: Arc::new(config),
            registry,
            authenticator,
            metadata,
            failures,
            lookup,
            deploy,
        })
    }

    /// Drop every merged metadata entry. Returns the number of entries dropped.
    pub fn purge_metadata_cache(&self) -> usize {
        let purged = self.metadata.purge();
        tracing::info!(purged, "Metadata cache purged");
        purged
    }

    pub fn failures(&self) -> &FailureLedger {
        &self.failures
    }
}
