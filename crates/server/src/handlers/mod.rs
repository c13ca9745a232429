//! HTTP request handlers.

pub mod repository;

pub use repository::*;
