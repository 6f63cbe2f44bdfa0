//! Command dispatcher: routes commands to transports and callbacks to events.
//!
//! Three tables track connections:
//! - `pending`: transports still in their handshake, not addressable yet;
//! - the [`Registry`]: open connections, the only ones commands can reach;
//! - `closing`: connections closed locally, kept until their close callback.
//!
//! A callback is honoured only if its connection id is in one of them.
//! Anything else comes from a superseded transport and is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wsb_protocol::{Command, DEFAULT_CLOSE_CODE, Event, Handle, Protocols, TRANSMIT_ON_CLOSED};
use wsb_socket::{Callback, CallbackSink, CloseInfo, ConnectionId, Connector, Payload, TransportSignal};

use crate::debug::DebugTap;
use crate::emitter::EventEmitter;
use crate::registry::{Connection, Registry};

/// Close code and reason sent to upstreams when their session ends.
const GOING_AWAY: (u16, &str) = (1001, "going away");

/// Longest close reason a close frame can carry, in bytes.
const MAX_CLOSE_REASON: usize = 123;

pub struct Dispatcher {
    connector: Arc<dyn Connector>,
    registry: Registry,
    pending: HashMap<Handle, Connection>,
    closing: HashMap<ConnectionId, Connection>,
    signals: mpsc::UnboundedSender<TransportSignal>,
    emitter: EventEmitter,
    tap: DebugTap,
}

impl Dispatcher {
    /// `signals` is the queue transports report into; the owner feeds what
    /// arrives there back through [`Dispatcher::on_signal`].
    pub fn new(
        connector: Arc<dyn Connector>,
        signals: mpsc::UnboundedSender<TransportSignal>,
        emitter: EventEmitter,
        tap: DebugTap,
    ) -> Self {
        Self {
            connector,
            registry: Registry::new(),
            pending: HashMap::new(),
            closing: HashMap::new(),
            signals,
            emitter,
            tap,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_pending(&self, handle: &Handle) -> bool {
        self.pending.contains_key(handle)
    }

    /// Connections the dispatcher still expects callbacks from.
    pub fn tracked(&self) -> usize {
        self.registry.len() + self.pending.len() + self.closing.len()
    }

    pub fn handle(&mut self, command: Command) {
        self.tap.command(&command);
        match command {
            Command::Open {
                handle,
                url,
                protocol,
            } => self.open(handle, url, protocol),
            Command::Transmit { handle, data } => self.transmit(handle, data),
            Command::Close {
                handle,
                code,
                reason,
            } => self.close(handle, code, reason),
        }
    }

    fn open(&mut self, handle: Handle, url: String, protocols: Protocols) {
        self.supersede(&handle);

        let sink = CallbackSink::new(handle.clone(), self.signals.clone());
        let id = sink.connection();
        match self.connector.connect(&url, &protocols, sink) {
            Ok(transport) => {
                debug!(%handle, %id, "Connecting to {url}");
                let connection = Connection::new(id, handle.clone(), url, protocols, transport);
                self.pending.insert(handle, connection);
            }
            Err(e) => {
                warn!(%handle, "Open rejected: {e}");
                self.emitter.emit(Event::error(handle, e.to_string()));
            }
        }
    }

    /// Tear down every connection still wired to `handle`.
    fn supersede(&mut self, handle: &Handle) {
        let stale_closing: Vec<ConnectionId> = self
            .closing
            .values()
            .filter(|c| &c.handle == handle)
            .map(|c| c.id)
            .collect();

        let stale = [self.registry.remove(handle), self.pending.remove(handle)]
            .into_iter()
            .flatten()
            .chain(stale_closing.iter().filter_map(|id| self.closing.remove(id)));

        for connection in stale {
            info!(
                %handle,
                id = %connection.id,
                state = ?connection.state,
                "Replacing existing connection"
            );
            connection.teardown(DEFAULT_CLOSE_CODE, "");
        }
    }

    fn transmit(&mut self, handle: Handle, data: String) {
        match self.registry.get_mut(&handle) {
            Some(connection) => connection.transport_mut().send(data),
            None => {
                debug!(%handle, "Transmit without an open connection");
                self.emitter.emit(Event::error(handle, TRANSMIT_ON_CLOSED));
            }
        }
    }

    fn close(&mut self, handle: Handle, code: Option<u16>, reason: Option<String>) {
        if !self.registry.contains(&handle) {
            debug!(%handle, "Close for a handle with no open connection, ignoring");
            return;
        }

        let code = code.unwrap_or(DEFAULT_CLOSE_CODE);
        let reason = reason.unwrap_or_default();
        if let Err(message) = validate_close(code, &reason) {
            self.emitter.emit(Event::error(handle, message));
            return;
        }

        if let Some(mut connection) = self.registry.remove(&handle) {
            debug!(%handle, code, "Closing connection");
            connection.transport_mut().close(code, reason);
            self.closing.insert(connection.id, connection);
        }
    }

    /// Report a frame that named `handle` but could not be decoded.
    pub fn reject(&mut self, handle: Handle, message: impl Into<String>) {
        self.emitter.emit(Event::error(handle, message));
    }

    /// True once the application fell so far behind that an event had to be
    /// dropped. The session must end; the event stream is no longer complete.
    pub fn is_overflowed(&self) -> bool {
        self.emitter.is_overflowed()
    }

    pub fn on_signal(&mut self, signal: TransportSignal) {
        self.tap.callback(&signal);

        let TransportSignal {
            connection,
            handle,
            callback,
        } = signal;
        if !self.is_live(connection, &handle) {
            debug!(%handle, %connection, "Dropping {} from a superseded connection", callback.name());
            return;
        }

        match callback {
            Callback::Open => self.on_open(connection, handle),
            Callback::Message(Payload::Text(text)) => {
                self.emitter.emit(Event::message(handle, text));
            }
            Callback::Message(other) => {
                self.emitter.emit(Event::error(
                    handle,
                    format!(
                        "Received non-string message of type {}, which cannot be handled",
                        other.kind_name()
                    ),
                ));
            }
            Callback::Error(message) => self.emitter.emit(Event::error(handle, message)),
            Callback::Close(info) => self.on_close(connection, handle, info),
        }
    }

    fn on_open(&mut self, id: ConnectionId, handle: Handle) {
        let Some(mut connection) = self.pending.remove(&handle) else {
            return;
        };
        if connection.id != id {
            self.pending.insert(handle, connection);
            return;
        }

        connection.mark_open();
        info!(%handle, %id, "Connected to {}", connection.url);
        self.registry.put(handle.clone(), connection);
        self.emitter.emit(Event::connected(handle));
    }

    fn on_close(&mut self, id: ConnectionId, handle: Handle, info: CloseInfo) {
        let mut removed = self.closing.remove(&id);
        if self.registry.get(&handle).is_some_and(|c| c.id == id) {
            removed = self.registry.remove(&handle);
        }
        if self.pending.get(&handle).is_some_and(|c| c.id == id) {
            removed = self.pending.remove(&handle);
        }

        info!(
            %handle,
            %id,
            code = info.code,
            clean = info.was_clean,
            lifetime = ?removed.map(|c| c.created_at.elapsed()),
            "Disconnected: {}",
            info.reason
        );
        self.emitter.emit(Event::disconnected(handle));
    }

    fn is_live(&self, id: ConnectionId, handle: &Handle) -> bool {
        self.registry.get(handle).is_some_and(|c| c.id == id)
            || self.pending.get(handle).is_some_and(|c| c.id == id)
            || self.closing.contains_key(&id)
    }

    /// Detach and close everything. No events are emitted.
    pub fn shutdown(&mut self) {
        let (code, reason) = GOING_AWAY;
        let connections: Vec<Connection> = self
            .registry
            .drain()
            .map(|(_, c)| c)
            .chain(self.pending.drain().map(|(_, c)| c))
            .chain(self.closing.drain().map(|(_, c)| c))
            .collect();

        if !connections.is_empty() {
            info!("Shutting down {} connection(s)", connections.len());
        }
        for connection in connections {
            connection.teardown(code, reason);
        }
    }
}

/// Same limits a browser socket enforces on `close(code, reason)`.
fn validate_close(code: u16, reason: &str) -> Result<(), String> {
    if code != DEFAULT_CLOSE_CODE && !(3000..=4999).contains(&code) {
        return Err(format!(
            "invalid close code {code}: must be 1000 or between 3000 and 4999"
        ));
    }
    if reason.len() > MAX_CLOSE_REASON {
        return Err(format!(
            "close reason is {} bytes, the limit is {MAX_CLOSE_REASON}",
            reason.len()
        ));
    }
    Ok(())
}
