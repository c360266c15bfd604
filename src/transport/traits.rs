//! Transport trait abstraction for accepted connections

use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream a session can run over
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Human-readable peer description for logs and the status display
    fn peer_label(&self) -> String;
}
