//! Scripted in-memory connector for exercising transport owners.
//!
//! Every call is recorded in order. Depending on [`MockBehaviour`] the mock
//! completes its handshake synchronously inside `connect`, echoes sent text
//! back as a message, and answers `close` with a clean close callback. Tests
//! can also grab a transport's [`CallbackSlot`] and fire callbacks by hand.

use std::sync::Arc;

use parking_lot::Mutex;
use wsb_protocol::{Handle, Protocols};

use crate::error::SocketError;
use crate::policy::ConnectPolicy;
use crate::transport::{CallbackSink, CallbackSlot, CloseInfo, Connector, Payload, Transport};

/// A recorded transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect {
        handle: Handle,
        url: String,
        protocols: Vec<String>,
    },
    Send {
        handle: Handle,
        data: String,
    },
    Close {
        handle: Handle,
        code: u16,
        reason: String,
    },
    Detach {
        handle: Handle,
    },
}

/// What the mock does on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBehaviour {
    /// Fire `open` from inside `connect`.
    pub auto_open: bool,
    /// Answer every `send` with a text message carrying the same data.
    pub echo: bool,
    /// Answer `close` with a clean `close` callback.
    pub close_on_close: bool,
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<MockCall>>,
    slots: Mutex<Vec<(Handle, CallbackSlot)>>,
}

#[derive(Clone)]
pub struct MockConnector {
    behaviour: MockBehaviour,
    policy: ConnectPolicy,
    state: Arc<MockState>,
}

impl MockConnector {
    /// Handshakes only complete when a test fires `on_open` itself.
    pub fn manual() -> Self {
        Self::with_behaviour(MockBehaviour::default())
    }

    /// Opens synchronously, echoes text, closes cleanly.
    pub fn echoing() -> Self {
        Self::with_behaviour(MockBehaviour {
            auto_open: true,
            echo: true,
            close_on_close: true,
        })
    }

    pub fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            policy: ConnectPolicy::default(),
            state: Arc::new(MockState::default()),
        }
    }

    pub fn with_policy(mut self, policy: ConnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Every operation so far, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().clone()
    }

    /// Operations that touched `handle`.
    pub fn calls_for(&self, handle: &Handle) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|call| call_handle(call) == handle)
            .collect()
    }

    /// Callback slot of the most recent transport built for `handle`.
    pub fn slot(&self, handle: &Handle) -> Option<CallbackSlot> {
        self.slots(handle).pop()
    }

    /// Callback slots of every transport built for `handle`, oldest first.
    pub fn slots(&self, handle: &Handle) -> Vec<CallbackSlot> {
        self.state
            .slots
            .lock()
            .iter()
            .filter(|(h, _)| h == handle)
            .map(|(_, slot)| slot.clone())
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.state.calls.lock().push(call);
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        url: &str,
        protocols: &Protocols,
        sink: CallbackSink,
    ) -> Result<Box<dyn Transport>, SocketError> {
        self.policy.check(url, protocols)?;

        let handle = sink.handle().clone();
        self.record(MockCall::Connect {
            handle: handle.clone(),
            url: url.to_string(),
            protocols: protocols.as_slice().to_vec(),
        });

        let slot = CallbackSlot::new(sink);
        self.state.slots.lock().push((handle.clone(), slot.clone()));
        if self.behaviour.auto_open {
            slot.on_open();
        }

        Ok(Box::new(MockTransport {
            handle,
            slot,
            connector: self.clone(),
        }))
    }
}

struct MockTransport {
    handle: Handle,
    slot: CallbackSlot,
    connector: MockConnector,
}

impl Transport for MockTransport {
    fn send(&mut self, data: String) {
        self.connector.record(MockCall::Send {
            handle: self.handle.clone(),
            data: data.clone(),
        });
        if self.connector.behaviour.echo {
            self.slot.on_message(Payload::Text(data));
        }
    }

    fn close(&mut self, code: u16, reason: String) {
        self.connector.record(MockCall::Close {
            handle: self.handle.clone(),
            code,
            reason: reason.clone(),
        });
        if self.connector.behaviour.close_on_close {
            self.slot.on_close(CloseInfo::clean(code, reason));
        }
    }

    fn detach(&mut self) {
        self.connector.record(MockCall::Detach {
            handle: self.handle.clone(),
        });
        self.slot.detach();
    }
}

fn call_handle(call: &MockCall) -> &Handle {
    match call {
        MockCall::Connect { handle, .. }
        | MockCall::Send { handle, .. }
        | MockCall::Close { handle, .. }
        | MockCall::Detach { handle } => handle,
    }
}
