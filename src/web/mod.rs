//! HTTP transport (Axum + framing middleware).

pub mod api;
pub mod framing;
pub mod router;
pub mod server;

pub use server::run_server;
