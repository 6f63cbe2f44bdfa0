//! Inbound commands: `[handle, kind, data]`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::handle::Handle;
use crate::kinds::CommandKinds;

/// A command from the application, one per inbound tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open (or replace) the connection bound to `handle`.
    Open {
        handle: Handle,
        url: String,
        protocol: Protocols,
    },
    /// Send `data` verbatim on the open connection bound to `handle`.
    Transmit { handle: Handle, data: String },
    /// Close the open connection bound to `handle`.
    Close {
        handle: Handle,
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// Subprotocols requested for an `open`, in preference order.
///
/// On the wire the field may be absent, `null`, a single string or an array
/// of strings. A lone empty string means "no subprotocol".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Protocols(Vec<String>);

impl Protocols {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Value for a `Sec-WebSocket-Protocol` request header.
    pub fn header_value(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join(", "))
        }
    }
}

impl From<&str> for Protocols {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Self::none()
        } else {
            Self(vec![value.to_string()])
        }
    }
}

impl From<Vec<String>> for Protocols {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProtocolField {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct OpenData {
    url: String,
    #[serde(default)]
    protocol: Option<ProtocolField>,
}

#[derive(Deserialize, Default)]
struct CloseData {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    reason: Option<String>,
}

impl Command {
    /// Decode one inbound text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let raw: Value = serde_json::from_str(text)?;
        Self::from_value(raw)
    }

    /// Decode an already-parsed tuple.
    pub fn from_value(raw: Value) -> Result<Self, DecodeError> {
        let Value::Array(parts) = raw else {
            return Err(DecodeError::Shape(
                "expected a [handle, kind, data] array".into(),
            ));
        };
        let [handle, kind, data]: [Value; 3] = parts.try_into().map_err(|parts: Vec<Value>| {
            DecodeError::Shape(format!("expected 3 elements, got {}", parts.len()))
        })?;

        let handle: Handle = serde_json::from_value(handle)
            .map_err(|_| DecodeError::Shape("handle must be a string or an integer".into()))?;
        let Value::String(kind) = kind else {
            return Err(DecodeError::Shape("kind must be a string".into()));
        };

        match kind.as_str() {
            CommandKinds::OPEN => {
                let open: OpenData = serde_json::from_value(data).map_err(|e| {
                    DecodeError::InvalidData {
                        handle: handle.clone(),
                        kind: CommandKinds::OPEN,
                        reason: e.to_string(),
                    }
                })?;
                let protocol = match open.protocol {
                    None => Protocols::none(),
                    Some(ProtocolField::One(p)) => Protocols::from(p.as_str()),
                    Some(ProtocolField::Many(list)) => Protocols::from(list),
                };
                Ok(Self::Open {
                    handle,
                    url: open.url,
                    protocol,
                })
            }
            CommandKinds::TRANSMIT => match data {
                Value::String(data) => Ok(Self::Transmit { handle, data }),
                other => Err(DecodeError::InvalidData {
                    handle,
                    kind: CommandKinds::TRANSMIT,
                    reason: format!("expected a string payload, got {}", json_type(&other)),
                }),
            },
            CommandKinds::CLOSE => {
                let close = if data.is_null() {
                    CloseData::default()
                } else {
                    serde_json::from_value(data).map_err(|e| DecodeError::InvalidData {
                        handle: handle.clone(),
                        kind: CommandKinds::CLOSE,
                        reason: e.to_string(),
                    })?
                };
                Ok(Self::Close {
                    handle,
                    code: close.code,
                    reason: close.reason,
                })
            }
            _ => Err(DecodeError::UnknownKind { handle, kind }),
        }
    }

    pub fn handle(&self) -> &Handle {
        match self {
            Self::Open { handle, .. } | Self::Transmit { handle, .. } | Self::Close { handle, .. } => {
                handle
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open { .. } => CommandKinds::OPEN,
            Self::Transmit { .. } => CommandKinds::TRANSMIT,
            Self::Close { .. } => CommandKinds::CLOSE,
        }
    }

    /// Encode back into the wire tuple. Used by clients and tests.
    pub fn encode(&self) -> String {
        let value = match self {
            Self::Open {
                handle,
                url,
                protocol,
            } => serde_json::json!([handle, CommandKinds::OPEN, {
                "url": url,
                "protocol": protocol.as_slice(),
            }]),
            Self::Transmit { handle, data } => {
                serde_json::json!([handle, CommandKinds::TRANSMIT, data])
            }
            Self::Close {
                handle,
                code,
                reason,
            } => serde_json::json!([handle, CommandKinds::CLOSE, {
                "code": code,
                "reason": reason,
            }]),
        };
        value.to_string()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
