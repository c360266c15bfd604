//! Byte-accumulation buffer over a stream source
//!
//! [`FrameBuffer`] owns the read side of a connection and everything read
//! from it that has not been consumed yet. Both codecs pull from it:
//! [`FrameBuffer::decode`] runs any [`Decoder`] against the buffered bytes,
//! reading more only when the decoder needs it.

use std::io;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;

/// Default size of a single read from the source
pub const READ_CHUNK: usize = 4096;

/// Errors from delimiter scans
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Delimiter not found within {0} bytes")]
    LimitExceeded(usize),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Buffered reader with delimiter and exact-length reads
#[derive(Debug)]
pub struct FrameBuffer<R> {
    reader: R,
    buffer: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameBuffer<R> {
    /// Create an empty buffer over `reader`
    pub fn new(reader: R) -> Self {
        Self::with_buffer(reader, BytesMut::with_capacity(READ_CHUNK))
    }

    /// Create a buffer whose first contents are `initial`
    pub fn with_buffer(reader: R, initial: BytesMut) -> Self {
        Self {
            reader,
            buffer: initial,
            eof: false,
        }
    }

    /// Bytes read but not yet consumed
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// True once the source has reported end of stream
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Read one chunk from the source; returns 0 at end of stream
    pub async fn fill(&mut self) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }
        self.buffer.reserve(READ_CHUNK);
        let n = self.reader.read_buf(&mut self.buffer).await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    /// Consume and return everything up to and including `delimiter`
    ///
    /// Returns `Ok(None)` if the stream ends first. Fails once `limit`
    /// bytes are buffered without a delimiter.
    pub async fn read_until(
        &mut self,
        delimiter: &[u8],
        limit: usize,
    ) -> Result<Option<BytesMut>, BufferError> {
        let mut searched: usize = 0;
        loop {
            let start = searched.saturating_sub(delimiter.len().saturating_sub(1));
            if let Some(pos) = self.buffer[start..]
                .windows(delimiter.len())
                .position(|w| w == delimiter)
            {
                let end = start + pos + delimiter.len();
                return Ok(Some(self.buffer.split_to(end)));
            }
            searched = self.buffer.len();

            if self.buffer.len() >= limit {
                return Err(BufferError::LimitExceeded(limit));
            }
            if self.fill().await? == 0 {
                return Ok(None);
            }
        }
    }

    /// Consume exactly `n` bytes, reading as needed
    pub async fn read_exact(&mut self, n: usize) -> io::Result<Bytes> {
        while self.buffer.len() < n {
            if self.fill().await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended with {} of {} bytes", self.buffer.len(), n),
                ));
            }
        }
        Ok(self.buffer.split_to(n).freeze())
    }

    /// Decode the next item, reading more bytes whenever the decoder needs them
    ///
    /// Returns `Ok(None)` at end of stream once the decoder has nothing left.
    pub async fn decode<D: Decoder>(&mut self, decoder: &mut D) -> Result<Option<D::Item>, D::Error> {
        loop {
            if self.eof {
                return decoder.decode_eof(&mut self.buffer);
            }
            if let Some(item) = decoder.decode(&mut self.buffer)? {
                return Ok(Some(item));
            }
            self.fill().await?;
        }
    }

    /// Give back the reader and any unconsumed bytes
    pub fn into_parts(self) -> (R, BytesMut) {
        (self.reader, self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LineJsonCodec;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_read_until_across_chunks() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut buf = FrameBuffer::new(rx);

        tokio::spawn(async move {
            tx.write_all(b"GET / HTTP/1.1\r\nHost: a\r").await.expect("write");
            tx.write_all(b"\n\r\nrest").await.expect("write");
        });

        let block = buf
            .read_until(b"\r\n\r\n", 1024)
            .await
            .expect("read")
            .expect("delimiter");
        assert_eq!(&block[..], b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");

        let rest = buf.read_exact(4).await.expect("read");
        assert_eq!(&rest[..], b"rest");
    }

    #[tokio::test]
    async fn test_read_until_limit() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut buf = FrameBuffer::new(rx);
        tx.write_all(b"no delimiter here at all").await.expect("write");

        let err = buf.read_until(b"\n", 8).await.unwrap_err();
        assert!(matches!(err, BufferError::LimitExceeded(8)));
    }

    #[tokio::test]
    async fn test_read_until_eof() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut buf = FrameBuffer::new(rx);
        tx.write_all(b"partial").await.expect("write");
        drop(tx);

        assert!(buf.read_until(b"\n", 64).await.expect("read").is_none());
        assert!(buf.is_eof());
        assert_eq!(buf.buffered(), b"partial");
    }

    #[tokio::test]
    async fn test_read_exact_short_stream() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut buf = FrameBuffer::new(rx);
        tx.write_all(b"abc").await.expect("write");
        drop(tx);

        let err = buf.read_exact(4).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_decode_uses_initial_contents() {
        let (tx, rx) = tokio::io::duplex(64);
        drop(tx);
        let mut buf = FrameBuffer::with_buffer(rx, BytesMut::from(&b"one\ntwo"[..]));
        let mut codec = LineJsonCodec::new();

        assert_eq!(buf.decode(&mut codec).await.expect("decode").as_deref(), Some("one"));
        assert_eq!(buf.decode(&mut codec).await.expect("decode").as_deref(), Some("two"));
        assert_eq!(buf.decode(&mut codec).await.expect("decode"), None);
    }
}
