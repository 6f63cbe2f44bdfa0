//! Session actor: runs a [`Dispatcher`] on its own task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wsb_protocol::{Command, DecodeError, Event};
use wsb_socket::Connector;

use crate::debug::DebugTap;
use crate::dispatcher::Dispatcher;
use crate::emitter::{DEFAULT_EVENT_CAPACITY, EventEmitter};

/// Per-session settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Trace every command and transport callback.
    pub debug: bool,
    /// Events buffered for the application. A session whose application
    /// falls further behind than this is shut down.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debug: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

enum SessionInput {
    Raw(String),
    Command(Command),
}

/// Sending side of a running session. Dropping it (or calling
/// [`SessionHandle::shutdown`]) ends the session and closes its connections.
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<SessionInput>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Submit one wire frame (`[handle, kind, data]`). Returns false if the
    /// session has already stopped.
    pub fn submit_text(&self, text: impl Into<String>) -> bool {
        self.inputs.send(SessionInput::Raw(text.into())).is_ok()
    }

    /// Submit an already-decoded command.
    pub fn submit(&self, command: Command) -> bool {
        self.inputs.send(SessionInput::Command(command)).is_ok()
    }

    /// Stop accepting commands and wait for the session to wind down.
    pub async fn shutdown(self) {
        let Self { inputs, task } = self;
        drop(inputs);
        if let Err(e) = task.await {
            warn!("Session task ended abnormally: {e}");
        }
    }
}

/// Start a session. Returns its handle and the application's event stream.
///
/// Inputs and transport signals queue without a bound; the actor drains them
/// without awaiting. Backlog builds up only in the event stream, which holds
/// at most `config.event_capacity` events.
///
/// Must be called from within a tokio runtime.
pub fn spawn_session(
    connector: Arc<dyn Connector>,
    config: SessionConfig,
) -> (SessionHandle, mpsc::Receiver<Event>) {
    let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
    let (signals_tx, signals_rx) = mpsc::unbounded_channel();
    let (emitter, events) = EventEmitter::bounded(config.event_capacity);

    let dispatcher = Dispatcher::new(connector, signals_tx, emitter, DebugTap::new(config.debug));
    let task = tokio::spawn(run(dispatcher, inputs_rx, signals_rx));

    (
        SessionHandle {
            inputs: inputs_tx,
            task,
        },
        events,
    )
}

async fn run(
    mut dispatcher: Dispatcher,
    mut inputs: mpsc::UnboundedReceiver<SessionInput>,
    mut signals: mpsc::UnboundedReceiver<wsb_socket::TransportSignal>,
) {
    loop {
        tokio::select! {
            // The dispatcher holds a sender, so this queue never closes.
            Some(signal) = signals.recv() => dispatcher.on_signal(signal),

            input = inputs.recv() => match input {
                Some(SessionInput::Raw(text)) => handle_text(&mut dispatcher, &text),
                Some(SessionInput::Command(command)) => dispatcher.handle(command),
                None => break,
            },
        }

        if dispatcher.is_overflowed() {
            warn!("Application is not reading events, ending session");
            break;
        }
    }

    dispatcher.shutdown();
    debug!("Session stopped");
}

fn handle_text(dispatcher: &mut Dispatcher, text: &str) {
    match Command::decode(text) {
        Ok(command) => dispatcher.handle(command),
        Err(DecodeError::UnknownKind { handle, kind }) => {
            warn!(%handle, "Received unknown command {kind:?}, ignoring");
        }
        Err(e @ DecodeError::InvalidData { .. }) => {
            warn!("Rejecting command: {e}");
            if let Some(handle) = e.handle() {
                dispatcher.reject(handle.clone(), e.to_string());
            }
        }
        Err(e) => warn!("Dropping malformed command: {e} (raw: {text})"),
    }
}
