//! HTTP API over the knowledge base, relation graph and chat session.

pub mod http;

pub use http::{create_router, AppState, HttpServer};
