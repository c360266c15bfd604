//! Newline-delimited JSON codec
//!
//! Wraps [`LinesCodec`] with a maximum line length so an unterminated line
//! cannot grow the read buffer without bound. After an over-long line the
//! codec discards input up to the next `\n` and then resumes.
//!
//! Decoded lines are trimmed of surrounding whitespace; blank lines are
//! skipped. Encoded responses are always terminated by a single `\n`.

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::limits::MAX_PAYLOAD_SIZE;
use crate::Response;

/// Line decode errors
///
/// `TooLong` and `InvalidUtf8` only cost the offending line.
#[derive(Error, Debug)]
pub enum LineError {
    #[error("Line too long: exceeded {0} bytes")]
    TooLong(usize),

    #[error("Line is not valid UTF-8")]
    InvalidUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LineError {
    /// True when only the current line is lost
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LineError::Io(_))
    }
}

/// NDJSON codec for one connection
#[derive(Debug)]
pub struct LineJsonCodec {
    inner: LinesCodec,
    max_line: usize,
}

impl LineJsonCodec {
    /// Create a codec with the default line limit
    pub fn new() -> Self {
        Self::with_max_line(MAX_PAYLOAD_SIZE)
    }

    /// Create a codec with a custom line limit
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line),
            max_line,
        }
    }

    fn map_error(&self, err: LinesCodecError) -> LineError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => LineError::TooLong(self.max_line),
            LinesCodecError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                LineError::InvalidUtf8
            }
            LinesCodecError::Io(e) => LineError::Io(e),
        }
    }

    fn next_line(
        &mut self,
        src: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<String>, LineError> {
        loop {
            let decoded = if eof {
                self.inner.decode_eof(src)
            } else {
                self.inner.decode(src)
            };
            match decoded {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Ok(Some(trimmed.to_string()));
                }
                Ok(None) => return Ok(None),
                Err(e) => return Err(self.map_error(e)),
            }
        }
    }
}

impl Default for LineJsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineJsonCodec {
    type Item = String;
    type Error = LineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, LineError> {
        self.next_line(src, false)
    }

    /// A final line without a trailing `\n` is still delivered at end of stream
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, LineError> {
        self.next_line(src, true)
    }
}

impl Encoder<&Response> for LineJsonCodec {
    type Error = LineError;

    fn encode(&mut self, response: &Response, dst: &mut BytesMut) -> Result<(), LineError> {
        let text = response.to_text();
        dst.reserve(text.len() + 1);
        dst.extend_from_slice(text.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}
