//! WebSocket frame model
//!
//! A [`Frame`] is one protocol unit on the wire: header bits, opcode and an
//! (already unmasked) payload. Masking is a property of the encoding and is
//! handled by [`crate::codec`], never stored on the frame itself.

use bytes::{BufMut, Bytes, BytesMut};

/// Status codes carried in Close frames
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Endpoint is going away (shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol violation by the peer
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Payload data inconsistent with the message type
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Message exceeds the configured size limit
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

/// Frame opcode (low 4 bits of the first header byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    /// Parse an opcode nibble; reserved values return `None`
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Wire value of this opcode
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    /// Close, Ping and Pong are control opcodes
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// Which end of the connection we are
///
/// Clients mask every frame they send; servers never mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// A single WebSocket frame with an unmasked payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from its parts
    pub fn new(fin: bool, opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            payload: payload.into(),
        }
    }

    /// Single-frame text message
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(true, Opcode::Text, Bytes::from(text.into()))
    }

    /// Single-frame binary message
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, Opcode::Binary, data)
    }

    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, Opcode::Ping, data)
    }

    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, Opcode::Pong, data)
    }

    /// Close frame carrying a big-endian status code and a UTF-8 reason
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code);
        payload.extend_from_slice(reason.as_bytes());
        Self::new(true, Opcode::Close, payload.freeze())
    }

    /// Status code of a Close frame, if the payload carries one
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Reason text of a Close frame (lossy UTF-8, empty if absent)
    pub fn close_reason(&self) -> String {
        if self.opcode != Opcode::Close || self.payload.len() <= 2 {
            return String::new();
        }
        String::from_utf8_lossy(&self.payload[2..]).into_owned()
    }
}
