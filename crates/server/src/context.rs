//! Per-request context handed to the lookup and deploy engines.

use crate::auth::Authenticator;
use crate::error::{ApiError, ApiResult};
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use depot_core::{Repository, RepositoryRegistry, Route, Session, View};
use depot_storage::ByteSource;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Response body produced by a resolved request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseBody {
    /// Stream the file at this path.
    File(PathBuf),
    /// In-memory content, e.g. merged metadata.
    Bytes(Bytes),
}

/// Normalized inbound request.
pub struct RequestContext {
    method: Method,
    uri: String,
    route: Route,
    address: String,
    headers: HeaderMap,
    authenticator: Arc<dyn Authenticator>,
    session: OnceLock<Option<Session>>,
    input: Mutex<Option<ByteSource>>,
    output: OnceLock<ResponseBody>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("view", &self.route.view)
            .field("filepath", &self.route.filepath)
            .field("address", &self.address)
            .finish()
    }
}

impl RequestContext {
    /// Route `uri` and build the context. Traversal attempts are rejected.
    pub fn create(
        registry: &RepositoryRegistry,
        authenticator: Arc<dyn Authenticator>,
        method: Method,
        uri: &str,
        headers: HeaderMap,
        address: impl Into<String>,
        input: Option<ByteSource>,
    ) -> ApiResult<Self> {
        let route = registry
            .route(uri)
            .ok_or_else(|| ApiError::BadRequest("Invalid GAV path".to_string()))?;

        Ok(Self {
            method,
            uri: uri.to_string(),
            route,
            address: address.into(),
            headers,
            authenticator,
            session: OnceLock::new(),
            input: Mutex::new(input),
            output: OnceLock::new(),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    /// Raw request path.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Sanitized path without leading slashes.
    pub fn sanitized(&self) -> &str {
        &self.route.sanitized
    }

    /// Path with the view or repository segment stripped.
    pub fn filepath(&self) -> &str {
        &self.route.filepath
    }

    pub fn view(&self) -> View {
        self.route.view
    }

    /// Candidate repositories in search order.
    pub fn repositories(&self) -> &[Arc<Repository>] {
        &self.route.repositories
    }

    /// Client address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Authenticated session, resolved on first use.
    pub fn session(&self) -> Option<&Session> {
        self.session
            .get_or_init(|| self.authenticator.authenticate(&self.headers))
            .as_ref()
    }

    /// Session authorized for `path`, if any.
    pub fn session_for(&self, path: &str) -> Option<&Session> {
        self.session().filter(|s| s.has_permission_to(path))
    }

    /// Take the request body. Returns `None` on the second call.
    pub fn take_input(&self) -> Option<ByteSource> {
        self.input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Set the response body. Returns false if it was already set.
    pub fn set_output(&self, body: ResponseBody) -> bool {
        self.output.set(body).is_ok()
    }

    pub fn into_output(self) -> Option<ResponseBody> {
        self.output.into_inner()
    }
}
