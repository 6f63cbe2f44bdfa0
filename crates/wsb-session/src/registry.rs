//! Registry: maps handles to open connections.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use wsb_protocol::{Handle, Protocols};
use wsb_socket::{ConnectionId, Transport};

/// Lifecycle of a connection while the bridge still tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport built, handshake not finished.
    Connecting,
    /// Handshake finished; addressable through the registry.
    Open,
}

/// One transport instance bound to a handle.
pub struct Connection {
    pub id: ConnectionId,
    pub handle: Handle,
    pub url: String,
    pub protocols: Protocols,
    pub state: ConnectionState,
    pub created_at: Instant,
    transport: Box<dyn Transport>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        handle: Handle,
        url: String,
        protocols: Protocols,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            id,
            handle,
            url,
            protocols,
            state: ConnectionState::Connecting,
            created_at: Instant::now(),
            transport,
        }
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    pub(crate) fn mark_open(&mut self) {
        self.state = ConnectionState::Open;
    }

    /// Silence the callbacks, then close. Nothing this transport does
    /// afterwards reaches the event stream.
    pub fn teardown(mut self, code: u16, reason: &str) {
        self.transport.detach();
        self.transport.close(code, reason.to_string());
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("url", &self.url)
            .field("protocols", &self.protocols)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Handle → open connection. Absence is the normal "not connected" answer.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<Handle, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` under `handle`, returning whatever it displaced.
    pub fn put(&mut self, handle: Handle, connection: Connection) -> Option<Connection> {
        self.connections.insert(handle, connection)
    }

    pub fn get(&self, handle: &Handle) -> Option<&Connection> {
        self.connections.get(handle)
    }

    pub fn get_mut(&mut self, handle: &Handle) -> Option<&mut Connection> {
        self.connections.get_mut(handle)
    }

    pub fn remove(&mut self, handle: &Handle) -> Option<Connection> {
        self.connections.remove(handle)
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.connections.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (Handle, Connection)> + '_ {
        self.connections.drain()
    }
}
