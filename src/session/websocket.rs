//! WebSocket message channel (server role)

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{debug, warn};

use super::SessionError;
use dezero_shared::{
    close_code, Assembled, CodecError, Frame, FrameBuffer, MessageAssembler, Response, Role,
    WebSocketCodec,
};
use tokio_util::codec::Encoder;

/// Reads whole messages and writes single-frame text replies
///
/// Pings are answered inline and a peer Close is echoed, so callers only
/// ever see application messages.
pub struct WebSocketChannel<S> {
    reader: FrameBuffer<ReadHalf<S>>,
    writer: WriteHalf<S>,
    codec: WebSocketCodec,
    assembler: MessageAssembler,
    open: bool,
}

impl<S: AsyncRead + AsyncWrite> WebSocketChannel<S> {
    /// Wrap a stream whose handshake is complete
    ///
    /// `reader` may already hold the first frame bytes.
    pub fn new(reader: FrameBuffer<ReadHalf<S>>, writer: WriteHalf<S>, max_payload: usize) -> Self {
        Self {
            reader,
            writer,
            codec: WebSocketCodec::with_max_payload(Role::Server, max_payload),
            assembler: MessageAssembler::new(max_payload),
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        let mut buf = BytesMut::new();
        self.codec
            .encode(frame, &mut buf)
            .map_err(|e| SessionError::Protocol {
                code: e.close_code(),
                message: e.to_string(),
            })?;
        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next complete Text or Binary message payload
    ///
    /// Returns `Ok(None)` once the peer has closed (cleanly or by ending the
    /// stream between frames).
    pub async fn recv(&mut self) -> Result<Option<Bytes>, SessionError> {
        while self.open {
            let frame = match self.reader.decode(&mut self.codec).await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("[WS] stream ended");
                    self.open = false;
                    return Ok(None);
                }
                Err(CodecError::Io(e)) => {
                    self.open = false;
                    return Err(e.into());
                }
                Err(e) => return Err(self.fail(e.close_code(), e.to_string()).await),
            };

            match self.assembler.push(frame) {
                Ok(Some(Assembled::Message { payload, .. })) => return Ok(Some(payload)),
                Ok(Some(Assembled::Ping(data))) => {
                    debug!("[WS] ping ({} bytes)", data.len());
                    self.write_frame(Frame::pong(data)).await?;
                }
                Ok(Some(Assembled::Close { code, reason })) => {
                    debug!("[WS] peer closed: code={:?} reason={:?}", code, reason);
                    let echo = code.unwrap_or(close_code::NORMAL);
                    if let Err(e) = self.close(echo, "").await {
                        debug!("[WS] close echo failed: {}", e);
                    }
                    return Ok(None);
                }
                Ok(None) => {}
                Err(e) => return Err(self.fail(e.close_code(), e.to_string()).await),
            }
        }
        Ok(None)
    }

    /// Send a response as one Text frame
    pub async fn send(&mut self, response: &Response) -> Result<(), SessionError> {
        if !self.open {
            return Err(SessionError::Closed);
        }
        self.write_frame(Frame::text(response.to_text())).await
    }

    /// Send a Close frame and stop; later calls are no-ops
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<(), SessionError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.write_frame(Frame::close(code, reason)).await
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }

    /// Close with `code` after a protocol violation
    async fn fail(&mut self, code: u16, message: String) -> SessionError {
        warn!("[WS] protocol violation, closing with {}: {}", code, message);
        if let Err(e) = self.close(code, "").await {
            debug!("[WS] close after violation failed: {}", e);
        }
        SessionError::Protocol { code, message }
    }
}
