//! Message reassembly across fragmented frames
//!
//! Only Text and Binary frames may start a message. While a message is
//! open, only Continuation frames may extend it; control frames may be
//! interleaved and are surfaced immediately without disturbing the
//! partial message.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::frame::{close_code, Frame, Opcode};

/// Fragmentation sequencing errors (all connection-fatal)
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("Continuation frame without a message in progress")]
    UnexpectedContinuation,

    #[error("{0:?} frame arrived in the middle of a fragmented message")]
    InterleavedDataFrame(Opcode),

    #[error("Reassembled message too large: {0} bytes (max: {1})")]
    MessageTooLarge(usize, usize),
}

impl AssemblyError {
    /// Close status to send before dropping the connection
    pub fn close_code(&self) -> u16 {
        match self {
            AssemblyError::MessageTooLarge(..) => close_code::MESSAGE_TOO_BIG,
            _ => close_code::PROTOCOL_ERROR,
        }
    }
}

/// Output of feeding one frame to the assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// A complete application message
    Message { opcode: Opcode, payload: Bytes },
    /// Peer ping; answer with a Pong echoing the payload
    Ping(Bytes),
    /// Peer close with its status code (if any) and reason
    Close { code: Option<u16>, reason: String },
}

/// Reassembles fragmented messages for one connection
#[derive(Debug)]
pub struct MessageAssembler {
    partial: Option<(Opcode, BytesMut)>,
    max_message: usize,
}

impl MessageAssembler {
    /// Create an assembler that rejects messages larger than `max_message`
    pub fn new(max_message: usize) -> Self {
        Self {
            partial: None,
            max_message,
        }
    }

    /// True while a fragmented message is being accumulated
    pub fn in_progress(&self) -> bool {
        self.partial.is_some()
    }

    /// Feed one frame
    ///
    /// Returns `Ok(None)` when the frame was absorbed (a fragment or a Pong).
    pub fn push(&mut self, frame: Frame) -> Result<Option<Assembled>, AssemblyError> {
        match frame.opcode {
            Opcode::Ping => Ok(Some(Assembled::Ping(frame.payload))),
            Opcode::Pong => Ok(None),
            Opcode::Close => {
                self.partial = None;
                Ok(Some(Assembled::Close {
                    code: frame.close_code(),
                    reason: frame.close_reason(),
                }))
            }
            Opcode::Text | Opcode::Binary => {
                if self.partial.is_some() {
                    return Err(AssemblyError::InterleavedDataFrame(frame.opcode));
                }
                if frame.fin {
                    return Ok(Some(Assembled::Message {
                        opcode: frame.opcode,
                        payload: frame.payload,
                    }));
                }
                self.partial = Some((frame.opcode, BytesMut::from(&frame.payload[..])));
                Ok(None)
            }
            Opcode::Continuation => {
                let (opcode, mut data) = self
                    .partial
                    .take()
                    .ok_or(AssemblyError::UnexpectedContinuation)?;

                let total = data.len() + frame.payload.len();
                if total > self.max_message {
                    return Err(AssemblyError::MessageTooLarge(total, self.max_message));
                }
                data.extend_from_slice(&frame.payload);

                if frame.fin {
                    Ok(Some(Assembled::Message {
                        opcode,
                        payload: data.freeze(),
                    }))
                } else {
                    self.partial = Some((opcode, data));
                    Ok(None)
                }
            }
        }
    }
}
