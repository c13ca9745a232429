//! Common test utilities.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use depot_core::Repository;
use depot_core::config::{AppConfig, RepositoryConfig, TokenConfig};
use depot_server::auth::hash_secret;
use depot_server::{AppState, create_router};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Credentials of the manager token every test server carries.
#[allow(dead_code)]
pub const ADMIN: (&str, &str) = ("admin", "admin-secret");

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub root: PathBuf,
    _temp_dir: TempDir,
}

/// A buffered response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with a single `main` repository.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let root = temp_dir.path().join("repositories");

        let mut config = AppConfig::for_testing(&root);
        config.tokens.push(token(ADMIN.0, ADMIN.1, "*", "m"));
        modifier(&mut config);

        let state = AppState::new(config).expect("Failed to build state");
        state.registry.load().expect("Failed to load repositories");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            root,
            _temp_dir: temp_dir,
        }
    }

    pub fn repository(&self, name: &str) -> Arc<Repository> {
        self.state
            .registry
            .get(name)
            .cloned()
            .expect("Unknown repository")
    }

    /// Write a file directly into a repository.
    pub fn write(&self, repository: &str, path: &str, content: impl AsRef<[u8]>) {
        let file = self.repository(repository).file(path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, content).unwrap();
    }

    pub fn read(&self, repository: &str, path: &str) -> Option<Vec<u8>> {
        std::fs::read(self.repository(repository).file(path)).ok()
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request("GET", uri, None, Vec::new()).await
    }

    pub async fn get_as(&self, uri: &str, credentials: (&str, &str)) -> TestResponse {
        self.request("GET", uri, Some(credentials), Vec::new()).await
    }

    pub async fn put(&self, uri: &str, credentials: Option<(&str, &str)>, body: impl Into<Vec<u8>>) -> TestResponse {
        self.request("PUT", uri, credentials, body.into()).await
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        credentials: Option<(&str, &str)>,
        body: Vec<u8>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((alias, secret)) = credentials {
            let encoded = STANDARD.encode(format!("{alias}:{secret}"));
            builder = builder.header("Authorization", format!("Basic {encoded}"));
        }

        let request = builder.body(Body::from(body)).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// A token accepted by the built-in authenticator.
#[allow(dead_code)]
pub fn token(alias: &str, secret: &str, path: &str, permissions: &str) -> TokenConfig {
    TokenConfig {
        alias: alias.to_string(),
        secret_sha256: hash_secret(secret),
        path: path.to_string(),
        permissions: permissions.to_string(),
    }
}

/// A repository configuration with the given name.
#[allow(dead_code)]
pub fn repository(name: &str) -> RepositoryConfig {
    RepositoryConfig::new(name)
}

#[allow(dead_code)]
pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}
