//! Core domain types for the depot artifact repository.
//!
//! This crate defines the data model shared by every other crate:
//! - Configuration and validation
//! - Hierarchical disk quotas
//! - Repositories and the ordered registry
//! - Request routing and views
//! - Sessions and permissions

pub mod config;
pub mod error;
pub mod quota;
pub mod registry;
pub mod repository;
pub mod route;
pub mod session;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use quota::{Capacity, QuotaNode};
pub use registry::RepositoryRegistry;
pub use repository::{METADATA_FILE, Repository};
pub use route::{Route, View, sanitize};
pub use session::{Permission, Permissions, Session};
