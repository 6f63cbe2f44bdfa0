//! Application-supplied connection handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier chosen by the application for one logical connection.
///
/// The bridge never invents handles; it only compares and echoes them back,
/// so the wire representation (string or integer) is preserved exactly.
///
/// Only strings and integers that fit in an `i64` are accepted. Floats,
/// booleans, `null` and integers above `i64::MAX` fail to decode as a
/// [`crate::DecodeError::Shape`]; with no usable handle there is nobody to
/// report the failure to, so such frames are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Handle {
    String(String),
    Number(i64),
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Handle {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Handle {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}
