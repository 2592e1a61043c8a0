//! Tidegate Web - HTTP streaming gateway
//!
//! The axum layer of the gateway: an explicitly owned router with the single
//! `/stream` route, the request handler resolving (info hash, episode) pairs
//! to live file streams, a range-capable content server, and the listener
//! lifecycle (bind, background serve, graceful shutdown).

pub mod content;
pub mod handlers;
pub mod server;

pub use server::{AppState, Gateway, GatewayError, router};
