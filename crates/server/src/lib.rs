//! HTTP server for the depot artifact repository.
//!
//! This crate provides the request path:
//! - Request context and authentication
//! - Lookup across repositories, delegates and remote mirrors
//! - Merged metadata serving
//! - Artifact deployment
//! - JSON browsing under `/api`
//! - The failure ledger

pub mod auth;
pub mod browse;
pub mod context;
pub mod deploy;
pub mod error;
pub mod failure;
pub mod handlers;
pub mod lookup;
pub mod proxy;
pub mod routes;
pub mod state;

pub use auth::{Authenticator, TokenAuthenticator, TraceId};
pub use context::{RequestContext, ResponseBody};
pub use error::ApiError;
pub use failure::FailureLedger;
pub use routes::create_router;
pub use state::AppState;
