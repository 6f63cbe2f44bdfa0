//! Event emitter: the outbound half of a session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use wsb_protocol::Event;

/// Events a session may buffer for its application before giving up on it.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Forwards events to the application unchanged and in order.
///
/// The queue is bounded. Events are never dropped silently: the first event
/// that does not fit marks the emitter overflowed, nothing is sent after it,
/// and the owning session is expected to shut down.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<Event>,
    overflowed: Arc<AtomicBool>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self {
            tx,
            overflowed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// An emitter with the default capacity plus the receiving end the
    /// application reads from.
    pub fn channel() -> (Self, mpsc::Receiver<Event>) {
        Self::bounded(DEFAULT_EVENT_CAPACITY)
    }

    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: Event) {
        if self.is_overflowed() {
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.overflowed.store(true, Ordering::Relaxed);
                warn!(
                    handle = %event.handle(),
                    kind = event.kind(),
                    capacity = self.tx.max_capacity(),
                    "Event queue full, application is not keeping up"
                );
            }
            Err(TrySendError::Closed(event)) => {
                debug!(
                    handle = %event.handle(),
                    kind = event.kind(),
                    "Event receiver gone, dropping event"
                );
            }
        }
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }
}
