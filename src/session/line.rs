//! Newline-delimited JSON channel

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

use super::SessionError;
use dezero_shared::{FrameBuffer, LineError, LineJsonCodec, Response};

/// Reads one message per line and writes one line per response
pub struct LineChannel<S> {
    reader: FrameBuffer<ReadHalf<S>>,
    writer: WriteHalf<S>,
    codec: LineJsonCodec,
    out: BytesMut,
    open: bool,
}

impl<S: AsyncRead + AsyncWrite> LineChannel<S> {
    /// `reader` may already hold the bytes read during negotiation
    pub fn new(reader: FrameBuffer<ReadHalf<S>>, writer: WriteHalf<S>, max_line: usize) -> Self {
        Self {
            reader,
            writer,
            codec: LineJsonCodec::with_max_line(max_line),
            out: BytesMut::new(),
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Next non-blank line, trimmed
    ///
    /// Over-long and non-UTF-8 lines are skipped. A final line without a
    /// terminator is still delivered at end of stream.
    pub async fn recv(&mut self) -> Result<Option<Bytes>, SessionError> {
        while self.open {
            match self.reader.decode(&mut self.codec).await {
                Ok(Some(line)) => return Ok(Some(Bytes::from(line))),
                Ok(None) => {
                    debug!("[LINE] stream ended");
                    self.open = false;
                }
                Err(LineError::Io(e)) => {
                    self.open = false;
                    return Err(e.into());
                }
                Err(e) => warn!("[LINE] skipping line: {}", e),
            }
        }
        Ok(None)
    }

    /// Write one response line and flush it before returning
    pub async fn send(&mut self, response: &Response) -> Result<(), SessionError> {
        if !self.open {
            return Err(SessionError::Closed);
        }
        self.out.clear();
        self.codec
            .encode(response, &mut self.out)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        self.writer.write_all(&self.out).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn channel(initial: &[u8]) -> (LineChannel<DuplexStream>, DuplexStream) {
        let (server, peer) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(server);
        let reader = FrameBuffer::with_buffer(read_half, BytesMut::from(initial));
        (LineChannel::new(reader, write_half, 64), peer)
    }

    #[tokio::test]
    async fn test_initial_bytes_are_first_message() {
        let (mut ch, mut peer) = channel(b"{\"command\":\"ping\"}\n{\"comm");
        peer.write_all(b"and\":\"scan_wifi\"}\n").await.expect("write");

        let first = ch.recv().await.expect("recv").expect("line");
        assert_eq!(&first[..], br#"{"command":"ping"}"#);
        let second = ch.recv().await.expect("recv").expect("line");
        assert_eq!(&second[..], br#"{"command":"scan_wifi"}"#);
    }

    #[tokio::test]
    async fn test_overlong_line_is_skipped() {
        let long = format!("{}\n{{\"command\":\"ping\"}}\n", "x".repeat(200));
        let (mut ch, mut peer) = channel(b"");
        peer.write_all(long.as_bytes()).await.expect("write");

        let line = ch.recv().await.expect("recv").expect("line");
        assert_eq!(&line[..], br#"{"command":"ping"}"#);
    }

    #[tokio::test]
    async fn test_unterminated_final_line_at_eof() {
        let (mut ch, peer) = channel(b"{\"command\":\"ping\"}");
        drop(peer);

        let line = ch.recv().await.expect("recv").expect("line");
        assert_eq!(&line[..], br#"{"command":"ping"}"#);
        assert!(ch.recv().await.expect("recv").is_none());
        assert!(!ch.is_open());
    }

    #[tokio::test]
    async fn test_send_writes_one_line() {
        let (mut ch, mut peer) = channel(b"");
        ch.send(&Response::Json(json!({"type": "pong"})))
            .await
            .expect("send");
        ch.send(&Response::Text("--- Execution Finished ---".into()))
            .await
            .expect("send");
        ch.shutdown().await.expect("shutdown");

        let mut written = String::new();
        peer.read_to_string(&mut written).await.expect("read");
        assert_eq!(written, "{\"type\":\"pong\"}\n--- Execution Finished ---\n");
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut ch, _peer) = channel(b"");
        ch.close();
        assert!(matches!(
            ch.send(&Response::Text("x".into())).await,
            Err(SessionError::Closed)
        ));
    }
}
