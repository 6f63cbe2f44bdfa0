//! ws-bridge transport layer
//!
//! Exposes sessions to applications over a WebSocket endpoint:
//! - `GET /ws` gives each application client its own session
//! - every text frame is one command, every event goes back as one text frame
//! - `GET /health` reports liveness and the client count
//!
//! Upstream sockets are built by whatever [`wsb_socket::Connector`] the
//! server is started with.

pub mod client;
pub mod server;

pub use client::AppClient;
pub use server::{TransportConfig, TransportError, TransportServer};
