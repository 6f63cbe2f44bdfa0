//! Synchronous connect failures.

use thiserror::Error;

/// Raised by [`crate::Connector::connect`] before any I/O happens.
///
/// The display text is what the application sees in its `error` event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SocketError {
    #[error("invalid websocket url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid subprotocol {0:?}")]
    InvalidProtocol(String),

    #[error("connection to {url:?} blocked: {reason}")]
    Security { url: String, reason: String },

    #[error("socket runtime unavailable: {0}")]
    Unavailable(String),
}

impl SocketError {
    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn security(url: &str, reason: impl Into<String>) -> Self {
        Self::Security {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
