//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Header carrying the client address when running behind a reverse proxy.
    /// Nginx: X-Forwarded-For, Cloudflare: CF-Connecting-IP, common: X-Real-IP.
    #[serde(default = "default_forwarded_ip_header")]
    pub forwarded_ip_header: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_forwarded_ip_header() -> String {
    "X-Forwarded-For".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            forwarded_ip_header: default_forwarded_ip_header(),
        }
    }
}

/// Repository storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per repository.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Global disk quota shared by every repository.
    /// Supported formats: 90%, 500MB, 10GB.
    #[serde(default = "default_disk_quota")]
    pub disk_quota: String,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./repositories")
}

fn default_disk_quota() -> String {
    "10GB".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            disk_quota: default_disk_quota(),
        }
    }
}

/// Remote mirror configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// How long to wait for a connection to a remote mirror, in seconds.
    #[serde(default = "default_proxy_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// How long to wait on reads from a remote mirror, in seconds.
    /// Slow mirrors may need a larger value.
    #[serde(default = "default_proxy_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_proxy_connect_timeout_secs() -> u64 {
    3
}

fn default_proxy_read_timeout_secs() -> u64 {
    15
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_proxy_connect_timeout_secs(),
            read_timeout_secs: default_proxy_read_timeout_secs(),
        }
    }
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Storage writer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Delay before a write blocked by a lock marker is attempted again.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Maximum number of re-attempts for a write blocked by a lock marker.
    /// Unset means the write is retried until the marker disappears.
    #[serde(default)]
    pub max_lock_retries: Option<u32>,
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            max_lock_retries: None,
        }
    }
}

impl WriterConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Access token accepted by the built-in authenticator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token alias, used as the Basic auth user name.
    pub alias: String,
    /// SHA256 hex digest of the token secret.
    /// Generate with: `echo -n "your-secret" | sha256sum`
    pub secret_sha256: String,
    /// Path scope: `*`, `/*/<prefix>` or `/<repository>/<prefix>`.
    pub path: String,
    /// Permission letters: `r` (read), `w` (write), `m` (manager).
    #[serde(default = "default_token_permissions")]
    pub permissions: String,
}

fn default_token_permissions() -> String {
    "r".to_string()
}

/// Single repository configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository name. Lowercase, no '-', not `releases` or `snapshots`.
    pub name: String,
    /// Path prefixes this repository accepts. Empty accepts every path.
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Require authentication to read.
    #[serde(default)]
    pub hidden: bool,
    /// Allow anonymous browsing.
    #[serde(default = "default_true")]
    pub browseable: bool,
    /// Allow users with write access to upload.
    #[serde(default = "default_true")]
    pub allow_uploads: bool,
    /// Repository quota. Empty inherits the global quota.
    #[serde(default)]
    pub disk_quota: String,
    /// Remote repositories consulted (and cached locally) on a local miss.
    #[serde(default)]
    pub proxies: Vec<String>,
    /// Repository to delegate misses to. Cannot be combined with `proxies`.
    #[serde(default)]
    pub delegate: String,
}

fn default_true() -> bool {
    true
}

impl RepositoryConfig {
    /// Create a repository configuration with default policy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefixes: Vec::new(),
            hidden: false,
            browseable: true,
            allow_uploads: true,
            disk_quota: String::new(),
            proxies: Vec::new(),
            delegate: String::new(),
        }
    }

    /// Delegate name, if one is configured.
    pub fn delegate(&self) -> Option<&str> {
        let delegate = self.delegate.trim();
        (!delegate.is_empty()).then_some(delegate)
    }

    /// Prefixes without a leading slash and with a trailing one.
    pub fn normalized_prefixes(&self) -> Vec<String> {
        self.prefixes
            .iter()
            .map(|prefix| prefix.trim().trim_start_matches('/'))
            .filter(|prefix| !prefix.is_empty())
            .map(with_trailing_slash)
            .collect()
    }

    /// Proxy URLs with a trailing slash.
    pub fn normalized_proxies(&self) -> Vec<String> {
        self.proxies
            .iter()
            .map(|proxy| proxy.trim())
            .filter(|proxy| !proxy.is_empty())
            .map(with_trailing_slash)
            .collect()
    }

    /// Validate single-repository invariants.
    pub fn validate(&self) -> Result<(), String> {
        crate::repository::validate_name(&self.name).map_err(|e| e.to_string())?;

        if let Some(delegate) = self.delegate() {
            if !self.normalized_proxies().is_empty() {
                return Err(format!(
                    "repository '{}' declares both a delegate and proxies",
                    self.name
                ));
            }
            if delegate == self.name {
                return Err(format!(
                    "repository '{}' cannot delegate to itself",
                    self.name
                ));
            }
        }

        if !self.disk_quota.trim().is_empty() {
            crate::quota::Capacity::parse(&self.disk_quota).map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}

fn with_trailing_slash(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

fn default_repositories() -> Vec<RepositoryConfig> {
    vec![RepositoryConfig::new("main")]
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Repository storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Remote mirror configuration.
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Storage writer configuration.
    #[serde(default)]
    pub writer: WriterConfig,
    /// Access tokens for the built-in authenticator.
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    /// Repositories, in search order.
    #[serde(default = "default_repositories")]
    pub repositories: Vec<RepositoryConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            proxy: ProxyConfig::default(),
            writer: WriterConfig::default(),
            tokens: Vec::new(),
            repositories: default_repositories(),
        }
    }
}

impl AppConfig {
    /// Create a test configuration rooted at the given directory.
    ///
    /// **For testing only.** Unlimited global quota, short writer retry delay.
    pub fn for_testing(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                root: root.into(),
                disk_quota: String::new(),
            },
            writer: WriterConfig {
                retry_delay_ms: 50,
                max_lock_retries: None,
            },
            ..Self::default()
        }
    }

    /// Validate cross-repository invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !self.storage.disk_quota.trim().is_empty() {
            crate::quota::Capacity::parse(&self.storage.disk_quota).map_err(|e| e.to_string())?;
        }

        let mut names = HashSet::new();
        for repository in &self.repositories {
            repository.validate()?;
            if !names.insert(repository.name.as_str()) {
                return Err(format!("duplicate repository name: {}", repository.name));
            }
        }

        for repository in &self.repositories {
            if let Some(delegate) = repository.delegate()
                && !names.contains(delegate)
            {
                return Err(format!(
                    "repository '{}' delegates to unknown repository '{}'",
                    repository.name, delegate
                ));
            }
        }

        for token in &self.tokens {
            crate::session::Permissions::parse(&token.permissions).map_err(|e| e.to_string())?;
            if token.alias.is_empty() {
                return Err("token alias cannot be empty".to_string());
            }
        }

        Ok(())
    }
}
