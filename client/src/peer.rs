//! Client side of the device link
//!
//! Speaks either wire mode. In WebSocket mode every outgoing frame is
//! masked with a fresh key and the server's accept value is verified.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::debug;

use dezero_shared::codec;
use dezero_shared::handshake;
use dezero_shared::{
    close_code, limits, Assembled, Frame, FrameBuffer, LineJsonCodec, MessageAssembler, Role,
    WebSocketCodec,
};

/// Most bytes accepted for the server's handshake response
const MAX_RESPONSE_HEADER: usize = 8 * 1024;

enum Mode {
    Line(LineJsonCodec),
    WebSocket {
        codec: WebSocketCodec,
        assembler: MessageAssembler,
    },
}

/// An open connection to a device
pub struct Peer<S> {
    reader: FrameBuffer<ReadHalf<S>>,
    writer: WriteHalf<S>,
    mode: Mode,
}

impl<S: AsyncRead + AsyncWrite> Peer<S> {
    /// Use line-delimited JSON
    pub fn line(stream: S) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        Self {
            reader: FrameBuffer::new(read_half),
            writer,
            mode: Mode::Line(LineJsonCodec::new()),
        }
    }

    /// Perform the opening handshake and switch to WebSocket framing
    pub async fn websocket(stream: S, host: &str) -> Result<Self> {
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = FrameBuffer::new(read_half);

        let key = handshake::generate_key();
        writer
            .write_all(handshake::request(host, "/", &key).as_bytes())
            .await?;
        writer.flush().await?;

        let block = reader
            .read_until(b"\r\n\r\n", MAX_RESPONSE_HEADER)
            .await?
            .ok_or_else(|| anyhow!("connection closed during handshake"))?;
        handshake::verify_response(&block, &key)?;
        debug!("[CLIENT] WebSocket upgrade complete");

        Ok(Self {
            reader,
            writer,
            mode: Mode::WebSocket {
                codec: WebSocketCodec::with_max_payload(Role::Client, limits::MAX_PAYLOAD_SIZE),
                assembler: MessageAssembler::new(limits::MAX_PAYLOAD_SIZE),
            },
        })
    }

    /// Send one command object
    pub async fn send(&mut self, command: &Value) -> Result<()> {
        let text = command.to_string();
        match &self.mode {
            Mode::Line(_) => {
                self.writer.write_all(text.as_bytes()).await?;
                self.writer.write_all(b"\n").await?;
            }
            Mode::WebSocket { .. } => {
                self.writer
                    .write_all(&codec::encode(&Frame::text(text), Role::Client))
                    .await?;
            }
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Next response line, or `None` once the device closes
    pub async fn next_response(&mut self) -> Result<Option<String>> {
        loop {
            let (decoder, assembler) = match &mut self.mode {
                Mode::Line(lines) => {
                    return self
                        .reader
                        .decode(lines)
                        .await
                        .context("failed to read response line");
                }
                Mode::WebSocket { codec, assembler } => (codec, assembler),
            };

            let Some(frame) = self.reader.decode(decoder).await? else {
                return Ok(None);
            };
            match assembler.push(frame)? {
                Some(Assembled::Message { payload, .. }) => return Ok(Some(text(payload))),
                Some(Assembled::Ping(data)) => {
                    self.writer
                        .write_all(&codec::encode(&Frame::pong(data), Role::Client))
                        .await?;
                }
                Some(Assembled::Close { code, reason }) => {
                    debug!("[CLIENT] device closed: {:?} {}", code, reason);
                    return Ok(None);
                }
                None => {}
            }
        }
    }

    /// Next response, or `None` if nothing arrives within `wait`
    pub async fn next_response_within(&mut self, wait: Duration) -> Result<Option<String>> {
        match tokio::time::timeout(wait, self.next_response()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    /// Close politely: a 1000 Close frame in WebSocket mode, then shut down
    pub async fn close(mut self) -> Result<()> {
        if let Mode::WebSocket { .. } = self.mode {
            let frame = Frame::close(close_code::NORMAL, "done");
            self.writer
                .write_all(&codec::encode(&frame, Role::Client))
                .await?;
        }
        self.writer.shutdown().await?;
        Ok(())
    }
}

fn text(payload: Bytes) -> String {
    String::from_utf8_lossy(&payload).into_owned()
}

/// Parse `key=value`; the value is JSON if it parses, else a string
pub fn parse_param(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("parameter '{}' is not key=value", raw);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("parameter '{}' has an empty key", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
