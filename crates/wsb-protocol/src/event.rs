//! Outbound events: `[handle, kind, payload]`.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

use crate::handle::Handle;
use crate::kinds::EventKinds;

/// An event addressed to the application, tagged with the originating handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The handshake for `handle` completed; it now accepts transmits.
    Connected { handle: Handle },
    /// The transport for `handle` closed.
    Disconnected { handle: Handle },
    /// A text frame arrived on `handle`.
    Message { handle: Handle, text: String },
    /// Something went wrong on `handle`. Never fatal.
    Error { handle: Handle, message: String },
}

impl Event {
    pub fn connected(handle: Handle) -> Self {
        Self::Connected { handle }
    }

    pub fn disconnected(handle: Handle) -> Self {
        Self::Disconnected { handle }
    }

    pub fn message(handle: Handle, text: impl Into<String>) -> Self {
        Self::Message {
            handle,
            text: text.into(),
        }
    }

    pub fn error(handle: Handle, message: impl Into<String>) -> Self {
        Self::Error {
            handle,
            message: message.into(),
        }
    }

    pub fn handle(&self) -> &Handle {
        match self {
            Self::Connected { handle }
            | Self::Disconnected { handle }
            | Self::Message { handle, .. }
            | Self::Error { handle, .. } => handle,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => EventKinds::CONNECTED,
            Self::Disconnected { .. } => EventKinds::DISCONNECTED,
            Self::Message { .. } => EventKinds::MESSAGE,
            Self::Error { .. } => EventKinds::ERROR,
        }
    }

    fn payload(&self) -> Option<&str> {
        match self {
            Self::Connected { .. } | Self::Disconnected { .. } => None,
            Self::Message { text, .. } => Some(text),
            Self::Error { message, .. } => Some(message),
        }
    }

    /// Encode as the wire tuple text.
    pub fn encode(&self) -> String {
        // Handles and strings always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(self.handle())?;
        tuple.serialize_element(self.kind())?;
        tuple.serialize_element(&self.payload())?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EventVisitor;

        impl<'de> Visitor<'de> for EventVisitor {
            type Value = Event;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a [handle, kind, payload] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Event, A::Error> {
                let handle: Handle = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let kind: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let payload: Option<String> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;

                let require = |payload: Option<String>| -> Result<String, A::Error> {
                    payload.ok_or_else(|| de::Error::custom(format!("{kind} event needs a payload")))
                };
                match kind.as_str() {
                    EventKinds::CONNECTED => Ok(Event::Connected { handle }),
                    EventKinds::DISCONNECTED => Ok(Event::Disconnected { handle }),
                    EventKinds::MESSAGE => Ok(Event::Message {
                        handle,
                        text: require(payload)?,
                    }),
                    EventKinds::ERROR => Ok(Event::Error {
                        handle,
                        message: require(payload)?,
                    }),
                    other => Err(de::Error::unknown_variant(
                        other,
                        &[
                            EventKinds::CONNECTED,
                            EventKinds::DISCONNECTED,
                            EventKinds::MESSAGE,
                            EventKinds::ERROR,
                        ],
                    )),
                }
            }
        }

        deserializer.deserialize_tuple(3, EventVisitor)
    }
}
