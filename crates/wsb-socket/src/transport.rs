//! Transport traits and the callback plumbing shared by every adapter.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use wsb_protocol::{Handle, Protocols};

use crate::error::SocketError;

/// Identifies one transport instance. A handle that is reopened gets a new id,
/// which is how late callbacks from the old instance are recognised.
pub type ConnectionId = uuid::Uuid;

/// A frame received from the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    /// Short name of the representation, used in error text.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Binary(_) => "binary",
        }
    }
}

/// How a transport finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseInfo {
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// 1006: the connection dropped without a closing handshake.
    pub fn abnormal() -> Self {
        Self {
            code: 1006,
            reason: String::new(),
            was_clean: false,
        }
    }
}

/// One transport callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Open,
    Message(Payload),
    Error(String),
    Close(CloseInfo),
}

impl Callback {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message(_) => "message",
            Self::Error(_) => "error",
            Self::Close(_) => "close",
        }
    }
}

/// A callback as it arrives on the owner's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSignal {
    pub connection: ConnectionId,
    pub handle: Handle,
    pub callback: Callback,
}

/// Destination for one transport's callbacks.
#[derive(Debug, Clone)]
pub struct CallbackSink {
    connection: ConnectionId,
    handle: Handle,
    tx: mpsc::UnboundedSender<TransportSignal>,
}

impl CallbackSink {
    /// A sink for a fresh connection on `handle`.
    pub fn new(handle: Handle, tx: mpsc::UnboundedSender<TransportSignal>) -> Self {
        Self {
            connection: uuid::Uuid::new_v4(),
            handle,
            tx,
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    fn deliver(&self, callback: Callback) {
        // The owner may already be gone; nothing left to notify.
        let _ = self.tx.send(TransportSignal {
            connection: self.connection,
            handle: self.handle.clone(),
            callback,
        });
    }
}

#[derive(Debug)]
struct SlotState {
    sink: Option<CallbackSink>,
    opened: bool,
}

/// The four callback slots of a transport, shared between the transport
/// handle and its I/O side.
///
/// Enforces the callback cardinality: `open` at most once and first, `close`
/// at most once and last. After [`CallbackSlot::detach`] every callback is a
/// no-op.
#[derive(Debug, Clone)]
pub struct CallbackSlot(Arc<Mutex<SlotState>>);

impl CallbackSlot {
    pub fn new(sink: CallbackSink) -> Self {
        Self(Arc::new(Mutex::new(SlotState {
            sink: Some(sink),
            opened: false,
        })))
    }

    pub fn on_open(&self) {
        let mut state = self.0.lock();
        if state.opened {
            return;
        }
        state.opened = true;
        if let Some(sink) = &state.sink {
            sink.deliver(Callback::Open);
        }
    }

    pub fn on_message(&self, payload: Payload) {
        let state = self.0.lock();
        if !state.opened {
            return;
        }
        if let Some(sink) = &state.sink {
            sink.deliver(Callback::Message(payload));
        }
    }

    pub fn on_error(&self, message: impl Into<String>) {
        if let Some(sink) = &self.0.lock().sink {
            sink.deliver(Callback::Error(message.into()));
        }
    }

    pub fn on_close(&self, info: CloseInfo) {
        if let Some(sink) = self.0.lock().sink.take() {
            sink.deliver(Callback::Close(info));
        }
    }

    /// Replace every callback with a no-op.
    pub fn detach(&self) {
        self.0.lock().sink = None;
    }

    pub fn is_attached(&self) -> bool {
        self.0.lock().sink.is_some()
    }
}

/// A live transport instance. All operations are fire-and-forget; outcomes
/// come back later through the callback slot.
pub trait Transport: Send {
    /// Queue a text frame.
    fn send(&mut self, data: String);

    /// Start the closing handshake.
    fn close(&mut self, code: u16, reason: String);

    /// Silence all callbacks. Called before `close` when the transport is
    /// being replaced.
    fn detach(&mut self);
}

/// Builds transports. `connect` validates synchronously; anything it accepts
/// reports its fate through `sink`.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        url: &str,
        protocols: &Protocols,
        sink: CallbackSink,
    ) -> Result<Box<dyn Transport>, SocketError>;
}
