//! ws-bridge session core: owns the connections for one application client.
//!
//! A session is an actor: one task owns the [`Dispatcher`] (and with it the
//! [`Registry`]) and processes inbound commands and transport callbacks one
//! at a time. Sessions share nothing, so any number can run side by side.

pub mod debug;
pub mod dispatcher;
pub mod emitter;
pub mod registry;
pub mod session;

pub use debug::DebugTap;
pub use dispatcher::Dispatcher;
pub use emitter::{DEFAULT_EVENT_CAPACITY, EventEmitter};
pub use registry::{Connection, ConnectionState, Registry};
pub use session::{SessionConfig, SessionHandle, spawn_session};
