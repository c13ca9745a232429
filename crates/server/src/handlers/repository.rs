//! Repository read and deploy endpoints.
//!
//! Every path is served by one fallback handler: artifact paths are free-form
//! and addressed by view, so they do not fit axum's route patterns.

use crate::auth::get_trace_id;
use crate::browse::FileEntry;
use crate::context::{RequestContext, ResponseBody};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use depot_storage::{ByteSource, StorageError};
use futures::TryStreamExt;
use std::net::SocketAddr;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::error;

/// Response header echoing the request's trace ID.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Fallback handler dispatching GET/HEAD to lookup and PUT/POST to deploy.
///
/// This is the only place where an unexpected fault turns into a generic
/// error response; such faults are recorded in the failure ledger.
pub async fn repository_fallback(State(state): State<AppState>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().clone();
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();

    let result = match method {
        Method::GET | Method::HEAD => lookup(&state, req).await,
        Method::PUT | Method::POST => deploy(&state, req).await,
        _ => Err(ApiError::MethodNotAllowed(format!("{method} is not supported"))),
    };

    let mut response = result.unwrap_or_else(|e| {
        if e.is_internal() {
            error!(trace_id = %trace_id, path = %path, error = %e, "Request failed");
            state.failures.record(&path, &e);
        }
        e.into_response()
    });

    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

async fn lookup(state: &AppState, req: Request) -> ApiResult<Response> {
    let ctx = context(state, req, false)?;

    if is_api(ctx.uri()) {
        let listing = state.lookup.browse(&ctx).await?;
        return Ok(Json(listing).into_response());
    }

    let details = state.lookup.resolve(&ctx).await?;
    let headers = [
        (CONTENT_TYPE, details.content_type.clone()),
        (CONTENT_LENGTH, details.content_length.to_string()),
    ];

    if ctx.is_head() {
        return Ok((StatusCode::OK, headers).into_response());
    }

    let body = match ctx.into_output() {
        Some(ResponseBody::File(path)) => {
            let file = tokio::fs::File::open(&path).await.map_err(StorageError::Io)?;
            Body::from_stream(ReaderStream::new(file))
        }
        Some(ResponseBody::Bytes(data)) => Body::from(data),
        None => Body::empty(),
    };
    Ok((StatusCode::OK, headers, body).into_response())
}

async fn deploy(state: &AppState, req: Request) -> ApiResult<Response> {
    let ctx = context(state, req, true)?;
    let task = state.deploy.deploy(&ctx)?;
    let details = task.wait().await?;
    Ok(Json(FileEntry::from(details)).into_response())
}

fn context(state: &AppState, req: Request, with_body: bool) -> ApiResult<RequestContext> {
    let (parts, body) = req.into_parts();
    let address = client_address(
        &parts.headers,
        &state.config.server.forwarded_ip_header,
        parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|c| c.0),
    );

    let input = with_body.then(|| {
        let stream = body.into_data_stream().map_err(std::io::Error::other);
        Box::pin(StreamReader::new(stream)) as ByteSource
    });

    RequestContext::create(
        &state.registry,
        state.authenticator.clone(),
        parts.method,
        parts.uri.path(),
        parts.headers,
        address,
        input,
    )
}

fn is_api(uri: &str) -> bool {
    uri == "/api" || uri.starts_with("/api/")
}

/// Client address: the first entry of the forwarded header if present,
/// otherwise the socket peer.
pub fn client_address(
    headers: &HeaderMap,
    forwarded_header: &str,
    peer: Option<SocketAddr>,
) -> String {
    let forwarded = headers
        .get(forwarded_header)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(forwarded), _) => forwarded.to_string(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}
