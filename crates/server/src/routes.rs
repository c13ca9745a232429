//! Route configuration.

use crate::auth::trace_middleware;
use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Middleware layers are applied in reverse order (outermost first).
    // Order of execution: TraceLayer -> trace id span -> handler
    Router::new()
        .fallback(handlers::repository_fallback)
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
