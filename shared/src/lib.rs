//! DeZer0 Shared Protocol Types
//!
//! This crate provides the wire-level pieces shared by the device endpoint
//! and the command-line client: WebSocket framing and handshake, the
//! newline-delimited JSON codec, and the command/response model.

pub mod assembler;
pub mod buffer;
pub mod codec;
pub mod frame;
pub mod handshake;
pub mod line;

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

pub use assembler::{Assembled, AssemblyError, MessageAssembler};
pub use buffer::{BufferError, FrameBuffer};
pub use codec::{CodecError, WebSocketCodec};
pub use frame::{close_code, Frame, Opcode, Role};
pub use handshake::{HandshakeError, HandshakeRequest};
pub use line::{LineError, LineJsonCodec};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Protocol limits
pub mod limits {
    /// Maximum frame payload / reassembled message / line size (512 KiB)
    pub const MAX_PAYLOAD_SIZE: usize = 512 * 1024;

    /// Upper bound on the bytes inspected during peer-mode negotiation
    pub const HANDSHAKE_PEEK_BYTES: usize = 1024;

    /// Negotiation read timeout in milliseconds
    pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

    /// Maximum networks reported by a Wi-Fi scan
    pub const MAX_SCAN_RESULTS: usize = 5;

    /// Maximum time a delegated program may run, in milliseconds
    pub const MAX_EXECUTION_TIME_MS: u64 = 60_000;
}

/// Command names understood by the device
pub mod commands {
    pub const GET_DEVICE_INFO: &str = "get_device_info";
    pub const SCAN_WIFI: &str = "scan_wifi";
    pub const EXECUTE_SCRIPT: &str = "execute_script";
    pub const PING: &str = "ping";
}

/// Plain-text lines bracketing delegated program output
pub mod markers {
    pub const EXECUTION_STARTED: &str = "--- Executing Script ---";
    pub const EXECUTION_FINISHED: &str = "--- Execution Finished ---";
    /// Prefix of every delegate failure line
    pub const SCRIPT_ERROR_PREFIX: &str = "Script Error: ";
}

/// A decoded command: its name plus every other field of the message
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub parameters: Map<String, Value>,
}

impl Command {
    /// Create a command with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Map::new(),
        }
    }

    /// Add a parameter (builder style)
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Parse a message body
    ///
    /// Returns:
    /// - `Ok(Some(command))` for a JSON object with a string `command` field
    /// - `Ok(None)` for valid JSON without one
    /// - `Err(...)` for malformed JSON
    pub fn parse(raw: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let Value::Object(mut fields) = serde_json::from_slice::<Value>(raw)? else {
            return Ok(None);
        };
        let name = match fields.remove("command") {
            Some(Value::String(name)) => name,
            _ => return Ok(None),
        };
        Ok(Some(Self {
            name,
            parameters: fields,
        }))
    }

    /// String parameter, if present and a string
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// Wire form: `{"command": name, ...parameters}`
    pub fn to_json(&self) -> Value {
        let mut fields = self.parameters.clone();
        fields.insert("command".into(), Value::String(self.name.clone()));
        Value::Object(fields)
    }
}

/// One response emitted for a command
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Structured result, serialized as compact JSON text
    Json(Value),
    /// Plain-text line (execution markers and delegate output)
    Text(String),
}

impl Response {
    /// Text sent on the wire (without any line terminator)
    pub fn to_text(&self) -> String {
        match self {
            Response::Json(value) => value.to_string(),
            Response::Text(text) => text.clone(),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Response::Json(value) => Some(value),
            Response::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Response::Text(text) => Some(text),
            Response::Json(_) => None,
        }
    }
}
