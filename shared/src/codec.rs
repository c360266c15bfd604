//! WebSocket frame codec (RFC6455 framing)
//!
//! Frames are laid out as:
//! ```text
//! [ FIN|RSV|opcode ][ MASK|len7 ][ ext len: 0, 2 or 8 bytes ][ mask key: 0 or 4 ][ payload ]
//! ```
//!
//! Decoding is incremental: [`decode`] leaves the buffer untouched until a
//! complete frame is available, so it can be called after every read.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{close_code, Frame, Opcode, Role};
use crate::limits::MAX_PAYLOAD_SIZE;

/// Largest payload a control frame may carry
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Errors that can occur while decoding frames
///
/// Every variant except [`CodecError::Io`] is a framing violation that is
/// fatal to the connection.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame payload too large: {0} bytes (max: {1})")]
    PayloadTooLarge(u64, usize),

    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    #[error("Reserved header bits set: {0:#04x}")]
    ReservedBits(u8),

    #[error("Unmasked frame received from client")]
    UnmaskedClientFrame,

    #[error("Masked frame received from server")]
    MaskedServerFrame,

    #[error("Fragmented control frame: {0:?}")]
    FragmentedControl(Opcode),

    #[error("Control frame payload too large: {0} bytes")]
    ControlTooLarge(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Close status to send before dropping the connection
    pub fn close_code(&self) -> u16 {
        match self {
            CodecError::PayloadTooLarge(..) => close_code::MESSAGE_TOO_BIG,
            _ => close_code::PROTOCOL_ERROR,
        }
    }
}

/// XOR `data` in place with the 4-byte mask key
///
/// Applying the same mask twice restores the original bytes.
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Encode a frame for the given role
///
/// Client frames get a fresh random mask; server frames are never masked.
pub fn encode(frame: &Frame, role: Role) -> Bytes {
    let mut buf = BytesMut::with_capacity(14 + frame.payload.len());
    encode_into(frame, role, &mut buf);
    buf.freeze()
}

/// Encode a frame for the given role into a provided buffer
pub fn encode_into(frame: &Frame, role: Role, buf: &mut BytesMut) {
    let mask = match role {
        Role::Client => Some(rand::random::<[u8; 4]>()),
        Role::Server => None,
    };
    encode_with_mask(frame, mask, buf);
}

/// Encode a frame with an explicit mask key (or none)
pub fn encode_with_mask(frame: &Frame, mask: Option<[u8; 4]>, buf: &mut BytesMut) {
    let len = frame.payload.len();
    buf.reserve(14 + len);

    let fin = if frame.fin { 0x80 } else { 0 };
    buf.put_u8(fin | frame.opcode.as_u8());

    let mask_bit = if mask.is_some() { 0x80 } else { 0 };
    if len < 126 {
        buf.put_u8(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u64(len as u64);
    }

    match mask {
        Some(key) => {
            buf.put_slice(&key);
            let start = buf.len();
            buf.extend_from_slice(&frame.payload);
            apply_mask(&mut buf[start..], key);
        }
        None => buf.extend_from_slice(&frame.payload),
    }
}

/// Try to decode one frame from the front of `buf`
///
/// `local` is the role of the decoding endpoint: a server requires masked
/// frames, a client requires unmasked ones.
///
/// Returns:
/// - `Ok(Some(frame))` if a complete frame was decoded and consumed
/// - `Ok(None)` if more data is needed (nothing is consumed)
/// - `Err(...)` if the header violates the protocol
pub fn decode(
    buf: &mut BytesMut,
    local: Role,
    max_payload: usize,
) -> Result<Option<Frame>, CodecError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let b0 = buf[0];
    let b1 = buf[1];

    if b0 & 0x70 != 0 {
        return Err(CodecError::ReservedBits(b0 & 0x70));
    }
    let fin = b0 & 0x80 != 0;
    let opcode = Opcode::from_u8(b0 & 0x0F).ok_or(CodecError::ReservedOpcode(b0 & 0x0F))?;

    let masked = b1 & 0x80 != 0;
    match (local, masked) {
        (Role::Server, false) => return Err(CodecError::UnmaskedClientFrame),
        (Role::Client, true) => return Err(CodecError::MaskedServerFrame),
        _ => {}
    }

    let (header_len, payload_len) = match b1 & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (4, u64::from(u16::from_be_bytes([buf[2], buf[3]])))
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            (10, u64::from_be_bytes(raw))
        }
        n => (2, u64::from(n)),
    };

    if opcode.is_control() {
        if !fin {
            return Err(CodecError::FragmentedControl(opcode));
        }
        if payload_len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(CodecError::ControlTooLarge(payload_len));
        }
    }

    if payload_len > max_payload as u64 {
        return Err(CodecError::PayloadTooLarge(payload_len, max_payload));
    }

    let payload_len = payload_len as usize;
    let mask_len = if masked { 4 } else { 0 };
    let total_len = header_len + mask_len + payload_len;

    if buf.len() < total_len {
        buf.reserve(total_len - buf.len());
        return Ok(None);
    }

    let mask = if masked {
        Some([
            buf[header_len],
            buf[header_len + 1],
            buf[header_len + 2],
            buf[header_len + 3],
        ])
    } else {
        None
    };

    buf.advance(header_len + mask_len);
    let mut payload = buf.split_to(payload_len);
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Some(Frame {
        fin,
        opcode,
        payload: payload.freeze(),
    }))
}

/// Streaming frame codec for one endpoint role
#[derive(Debug, Clone)]
pub struct WebSocketCodec {
    role: Role,
    max_payload: usize,
}

impl WebSocketCodec {
    /// Create a codec with the default payload limit
    pub fn new(role: Role) -> Self {
        Self::with_max_payload(role, MAX_PAYLOAD_SIZE)
    }

    /// Create a codec with a custom payload limit
    pub fn with_max_payload(role: Role, max_payload: usize) -> Self {
        Self { role, max_payload }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Decoder for WebSocketCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        decode(src, self.role, self.max_payload)
    }
}

impl Encoder<Frame> for WebSocketCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        encode_into(&frame, self.role, dst);
        Ok(())
    }
}
