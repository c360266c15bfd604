//! Peer-mode negotiation
//!
//! The opening bytes of a connection decide its wire mode. A complete
//! HTTP header block carrying `Sec-WebSocket-Key` upgrades to WebSocket;
//! anything else is line-delimited JSON and every byte read so far is kept
//! as the start of the first line.

use bytes::Buf;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::{Channel, LineChannel, SessionConfig, SessionError, WebSocketChannel};
use dezero_shared::handshake::header_end;
use dezero_shared::{FrameBuffer, HandshakeError, HandshakeRequest};

const UPGRADE_METHOD: &[u8] = b"GET ";

/// Pick the session's wire mode
///
/// Returns `Ok(None)` when the peer closed (or stayed silent past the
/// timeout) without sending anything.
pub async fn negotiate<S: AsyncRead + AsyncWrite>(
    stream: S,
    config: &SessionConfig,
) -> Result<Option<Channel<S>>, SessionError> {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = FrameBuffer::new(read_half);

    match tokio::time::timeout(config.handshake_timeout, peek(&mut reader, config.peek_bytes)).await
    {
        Ok(result) => result?,
        Err(_) => debug!(
            "[NEGOTIATE] peek timed out after {:?} with {} bytes",
            config.handshake_timeout,
            reader.buffered().len()
        ),
    }

    let buffered = reader.buffered();
    if buffered.is_empty() {
        return Ok(None);
    }

    match header_end(buffered) {
        Some(end) => {
            if let Some(request) = HandshakeRequest::parse(&buffered[..end]) {
                reader.buffer_mut().advance(end);
                write_half.write_all(request.response().as_bytes()).await?;
                write_half.flush().await?;
                info!("[NEGOTIATE] WebSocket upgrade accepted");
                return Ok(Some(Channel::WebSocket(WebSocketChannel::new(
                    reader,
                    write_half,
                    config.max_frame_payload,
                ))));
            }
        }
        None => {
            if HandshakeRequest::parse(buffered).is_some() {
                return Err(HandshakeError::Truncated.into());
            }
        }
    }

    debug!("[NEGOTIATE] no upgrade key, using line-delimited JSON");
    Ok(Some(Channel::LineJson(LineChannel::new(
        reader,
        write_half,
        config.max_line_bytes,
    ))))
}

/// Read until the opening bytes are conclusive
///
/// Stops at the end of an HTTP header block, at the first newline of
/// anything that cannot be an upgrade request, at `limit` bytes, or at end
/// of stream.
async fn peek<R: AsyncRead + Unpin>(
    reader: &mut FrameBuffer<R>,
    limit: usize,
) -> std::io::Result<()> {
    loop {
        let buf = reader.buffered();
        if buf.len() >= limit || header_end(buf).is_some() {
            return Ok(());
        }
        if !may_be_upgrade(buf) && buf.contains(&b'\n') {
            return Ok(());
        }
        if reader.fill().await? == 0 {
            return Ok(());
        }
    }
}

fn may_be_upgrade(buf: &[u8]) -> bool {
    let n = buf.len().min(UPGRADE_METHOD.len());
    buf[..n] == UPGRADE_METHOD[..n]
}
