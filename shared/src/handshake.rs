//! WebSocket opening handshake (HTTP/1.1 Upgrade)
//!
//! Server side: find `Sec-WebSocket-Key` in the request header block and
//! answer with `101 Switching Protocols`. Client side: build the upgrade
//! request and verify the server's `Sec-WebSocket-Accept`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Fixed GUID appended to the client key (RFC6455 section 1.3)
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const KEY_HEADER: &[u8] = b"sec-websocket-key:";
const ACCEPT_HEADER: &[u8] = b"sec-websocket-accept:";

/// Errors raised during an upgrade that is already in progress
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("Upgrade request header block is truncated")]
    Truncated,

    #[error("Server refused upgrade: {0}")]
    NotSwitching(String),

    #[error("Sec-WebSocket-Accept mismatch")]
    AcceptMismatch,
}

/// The part of an upgrade request the server needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub key: Vec<u8>,
}

impl HandshakeRequest {
    /// Scan header lines for `Sec-WebSocket-Key: <value>`
    ///
    /// Only CRLF-terminated lines are considered. An absent or empty key
    /// means the peer is not negotiating an upgrade.
    pub fn parse(header_block: &[u8]) -> Option<Self> {
        find_header(header_block, KEY_HEADER).map(|key| Self { key: key.to_vec() })
    }

    /// Accept value for this request's key
    pub fn accept_key(&self) -> String {
        accept_key(&self.key)
    }

    /// Full `101 Switching Protocols` response for this request
    pub fn response(&self) -> String {
        response(&self.accept_key())
    }
}

/// Compute `base64(SHA1(key || GUID))`
pub fn accept_key(key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Server handshake response
pub fn response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept
    )
}

/// Offset just past the blank line that ends an HTTP header block
pub fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Fresh client key: base64 of 16 random bytes
pub fn generate_key() -> String {
    BASE64.encode(rand::random::<[u8; 16]>())
}

/// Client upgrade request
pub fn request(host: &str, path: &str, key: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n",
        path, host, key
    )
}

/// Check a server response header block against the key we sent
pub fn verify_response(header_block: &[u8], key: &str) -> Result<(), HandshakeError> {
    let status_line = header_block
        .split(|b| *b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).trim().to_string())
        .unwrap_or_default();

    if !status_line.starts_with("HTTP/1.1 101") {
        return Err(HandshakeError::NotSwitching(status_line));
    }

    let accept = find_header(header_block, ACCEPT_HEADER).ok_or(HandshakeError::AcceptMismatch)?;
    if accept != accept_key(key.as_bytes()).as_bytes() {
        return Err(HandshakeError::AcceptMismatch);
    }
    Ok(())
}

/// Value of the first CRLF-terminated header whose lowercase name matches
fn find_header<'a>(block: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    let mut rest = block;
    while let Some(pos) = rest.windows(2).position(|w| w == b"\r\n") {
        let line = &rest[..pos];
        rest = &rest[pos + 2..];

        if line.len() >= name.len() && line[..name.len()].eq_ignore_ascii_case(name) {
            let value = line[name.len()..].trim_ascii();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}
