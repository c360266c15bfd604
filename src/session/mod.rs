//! Per-connection session handling
//!
//! A session negotiates the peer's wire mode once, then loops
//! decode → dispatch → respond until the stream ends or the channel closes.
//!
//! - [`negotiate`]: peek the opening bytes and pick a [`Channel`]
//! - [`WebSocketChannel`] / [`LineChannel`]: message I/O per mode
//! - [`ConnectionSession`]: lifecycle and status reporting

mod connection;
mod line;
mod negotiate;
mod websocket;

pub use connection::{ConnectionSession, SessionOutcome};
pub use line::LineChannel;
pub use negotiate::negotiate;
pub use websocket::WebSocketChannel;

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dezero_shared::{limits, HandshakeError, Response};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::Responder;

/// Errors that end a session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Stream closed, reset or otherwise unusable
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing violation; a Close with `code` was sent to the peer
    #[error("Protocol violation (close {code}): {message}")]
    Protocol { code: u16, message: String },

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Channel is closed")]
    Closed,
}

/// Wire mode chosen for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecMode {
    WebSocket,
    LineJson,
}

impl fmt::Display for CodecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecMode::WebSocket => write!(f, "websocket"),
            CodecMode::LineJson => write!(f, "line-json"),
        }
    }
}

/// Limits applied to every session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on the negotiation peek
    pub handshake_timeout: Duration,
    /// Most bytes inspected while negotiating
    pub peek_bytes: usize,
    pub max_frame_payload: usize,
    pub max_line_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(limits::HANDSHAKE_TIMEOUT_MS),
            peek_bytes: limits::HANDSHAKE_PEEK_BYTES,
            max_frame_payload: limits::MAX_PAYLOAD_SIZE,
            max_line_bytes: limits::MAX_PAYLOAD_SIZE,
        }
    }
}

/// A negotiated connection in either wire mode
pub enum Channel<S> {
    WebSocket(WebSocketChannel<S>),
    LineJson(LineChannel<S>),
}

impl<S: AsyncRead + AsyncWrite + Send> Channel<S> {
    pub fn mode(&self) -> CodecMode {
        match self {
            Channel::WebSocket(_) => CodecMode::WebSocket,
            Channel::LineJson(_) => CodecMode::LineJson,
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            Channel::WebSocket(ws) => ws.is_open(),
            Channel::LineJson(line) => line.is_open(),
        }
    }

    /// Next complete message, or `None` once the peer is done
    pub async fn recv(&mut self) -> Result<Option<Bytes>, SessionError> {
        match self {
            Channel::WebSocket(ws) => ws.recv().await,
            Channel::LineJson(line) => line.recv().await,
        }
    }

    pub async fn send(&mut self, response: &Response) -> Result<(), SessionError> {
        match self {
            Channel::WebSocket(ws) => ws.send(response).await,
            Channel::LineJson(line) => line.send(response).await,
        }
    }

    /// Close the channel; a WebSocket peer is sent a Close frame
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<(), SessionError> {
        match self {
            Channel::WebSocket(ws) => ws.close(code, reason).await,
            Channel::LineJson(line) => {
                line.close();
                Ok(())
            }
        }
    }

    /// Shut down the write side of the stream
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Channel::WebSocket(ws) => ws.shutdown().await,
            Channel::LineJson(line) => line.shutdown().await,
        }
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Send> Responder for Channel<S> {
    async fn respond(&mut self, response: Response) -> Result<(), SessionError> {
        self.send(&response).await
    }
}
