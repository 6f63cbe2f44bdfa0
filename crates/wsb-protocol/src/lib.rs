//! ws-bridge protocol types
//!
//! The application talks to the bridge through two channels of JSON
//! 3-tuples. Commands flow in as `[handle, kind, data]`, events flow out as
//! `[handle, kind, payload]`. This crate is the single source of truth for
//! handles, command and event kinds, and the decode errors raised at the
//! wire boundary.

pub mod command;
pub mod error;
pub mod event;
pub mod handle;
pub mod kinds;

pub use command::{Command, Protocols};
pub use error::DecodeError;
pub use event::Event;
pub use handle::Handle;
pub use kinds::{CommandKinds, EventKinds};

/// Close code used when a close command carries no explicit code.
pub const DEFAULT_CLOSE_CODE: u16 = 1000;

/// Error text for a transmit on a handle with no open connection.
pub const TRANSMIT_ON_CLOSED: &str = "cannot transmit on closed websocket";
