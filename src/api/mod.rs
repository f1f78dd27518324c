//! API module
//!
//! HTTP API endpoints, middleware, and the SSE egress surface.

pub mod middleware;
pub mod routes;
pub mod sse;

pub use routes::{create_router, AppState};
