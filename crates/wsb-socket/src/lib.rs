//! Socket transport adapter.
//!
//! A [`Connector`] builds [`Transport`]s. Each transport reports back through
//! a [`CallbackSlot`] wired at construction time: open, message, error and
//! close callbacks become [`TransportSignal`]s on the owner's queue. Slots can
//! be detached so a superseded transport goes silent before it is closed.
//!
//! Two connectors ship here: [`websocket::WebSocketConnector`] over
//! `tokio-tungstenite`, and `mock::MockConnector` for tests (behind the
//! `mock` feature).

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod policy;
pub mod transport;
pub mod websocket;

pub use error::SocketError;
pub use policy::ConnectPolicy;
pub use transport::{
    Callback, CallbackSink, CallbackSlot, CloseInfo, ConnectionId, Connector, Payload, Transport,
    TransportSignal,
};
pub use websocket::WebSocketConnector;
