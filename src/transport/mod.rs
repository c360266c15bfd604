//! Stream transports that sessions run over

pub mod tcp;
pub mod traits;

pub use tcp::TcpTransportStream;
pub use traits::TransportStream;

/// In-memory stream used as the socket in session tests
#[cfg(test)]
impl TransportStream for tokio::io::DuplexStream {
    fn peer_label(&self) -> String {
        "duplex".into()
    }
}
