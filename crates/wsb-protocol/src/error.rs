//! Errors raised while decoding inbound command tuples.

use thiserror::Error;

use crate::handle::Handle;

/// Why an inbound text frame could not be turned into a [`crate::Command`].
///
/// `InvalidData` carries a usable handle and is reported to the application
/// as an `error` event on that handle. The others are logged and the frame is
/// dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not valid JSON at all.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but not a `[handle, kind, data]` tuple.
    #[error("malformed command tuple: {0}")]
    Shape(String),

    /// Well-formed tuple with a kind this protocol does not know.
    #[error("unknown command kind {kind:?} for handle {handle}")]
    UnknownKind { handle: Handle, kind: String },

    /// Known kind whose data slot has the wrong shape.
    #[error("invalid {kind} data for handle {handle}: {reason}")]
    InvalidData {
        handle: Handle,
        kind: &'static str,
        reason: String,
    },
}

impl DecodeError {
    /// The handle named by the offending frame, when it got that far.
    pub fn handle(&self) -> Option<&Handle> {
        match self {
            Self::UnknownKind { handle, .. } | Self::InvalidData { handle, .. } => Some(handle),
            Self::Json(_) | Self::Shape(_) => None,
        }
    }
}
