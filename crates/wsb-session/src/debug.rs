//! Optional per-socket trace logging.

use tracing::info;
use wsb_protocol::Command;
use wsb_socket::TransportSignal;

/// Log target for traced commands and callbacks.
pub const TRACE_TARGET: &str = "ws_bridge::trace";

/// Logs every command and transport callback with its handle when enabled.
/// Observes only; never changes what happens next.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugTap {
    enabled: bool,
}

impl DebugTap {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn command(&self, command: &Command) {
        if self.enabled {
            info!(
                target: TRACE_TARGET,
                handle = %command.handle(),
                kind = command.kind(),
                "Command {command:?}"
            );
        }
    }

    pub fn callback(&self, signal: &TransportSignal) {
        if self.enabled {
            info!(
                target: TRACE_TARGET,
                handle = %signal.handle,
                connection = %signal.connection,
                callback = signal.callback.name(),
                "Callback {:?}",
                signal.callback
            );
        }
    }
}
