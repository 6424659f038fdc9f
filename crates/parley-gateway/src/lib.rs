//! HTTP surface of Parley: `POST /chat` streams a query's events as
//! `data:` frames, `GET /health` reports liveness.

/// CORS handling.
pub mod middleware;
/// Router and handlers.
pub mod server;

pub use server::GatewayServer;
