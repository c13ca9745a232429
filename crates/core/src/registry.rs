//! Ordered repository registry.

use crate::config::AppConfig;
use crate::quota::{Capacity, QuotaNode};
use crate::repository::Repository;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// Insertion-ordered collection of repositories sharing a global quota.
///
/// The order is the search order of the aggregate views.
#[derive(Debug)]
pub struct RepositoryRegistry {
    repositories: Vec<Arc<Repository>>,
    quota: Arc<QuotaNode>,
}

impl RepositoryRegistry {
    /// Build every configured repository. Nothing is touched on disk.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;

        let capacity =
            Capacity::parse(&config.storage.disk_quota)?.resolve_for_volume(&config.storage.root)?;
        let quota = QuotaNode::root(capacity);

        let repositories = config
            .repositories
            .iter()
            .map(|repository| {
                Repository::from_config(repository, &config.storage.root, &quota).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            repositories,
            quota,
        })
    }

    /// Create missing repository directories and account existing content.
    pub fn load(&self) -> Result<()> {
        for repository in &self.repositories {
            if repository.load()? {
                info!(repository = %repository.name(), "Repository has been created");
            }

            let hidden = if repository.is_hidden() { " (hidden)" } else { "" };
            info!(
                "+ {}{} {}",
                repository.name(),
                hidden,
                repository.quota()
            );
        }

        info!(
            repositories = self.repositories.len(),
            quota = %self.quota,
            "Repositories loaded"
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Repository>> {
        self.repositories.iter().find(|r| r.name() == name)
    }

    /// Repositories in search order.
    pub fn repositories(&self) -> &[Arc<Repository>] {
        &self.repositories
    }

    /// Global quota node.
    pub fn quota(&self) -> &Arc<QuotaNode> {
        &self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;

    fn config(root: &std::path::Path) -> AppConfig {
        AppConfig {
            repositories: vec![
                RepositoryConfig::new("releases2"),
                RepositoryConfig::new("private"),
                RepositoryConfig::new("snapshot"),
            ],
            ..AppConfig::for_testing(root)
        }
    }

    #[test]
    fn test_registry_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RepositoryRegistry::from_config(&config(dir.path())).unwrap();
        let names: Vec<_> = registry.repositories().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["releases2", "private", "snapshot"]);
        assert!(registry.get("private").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.repositories[0].delegate = "nowhere".to_string();
        assert!(matches!(
            RepositoryRegistry::from_config(&config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_repository_quotas_chain_to_global() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.storage.disk_quota = "1KB".to_string();
        let registry = RepositoryRegistry::from_config(&config).unwrap();

        registry.get("private").unwrap().quota().allocate(1024);

        assert!(!registry.quota().has_space());
        assert!(!registry.get("snapshot").unwrap().quota().has_space());
    }

    #[test]
    fn test_load_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RepositoryRegistry::from_config(&config(dir.path())).unwrap();
        registry.load().unwrap();
        for repository in registry.repositories() {
            assert!(repository.root().is_dir());
        }
    }
}
