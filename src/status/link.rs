//! Network link status

use std::net::{IpAddr, SocketAddr, UdpSocket};

use tracing::debug;

/// Provider of "connected? / local address" for readiness reporting
pub trait LinkStatus: Send + Sync {
    fn is_connected(&self) -> bool;
    fn local_address(&self) -> Option<IpAddr>;
}

/// Link status derived from the listener's bound address
///
/// An unspecified bind address (`0.0.0.0` / `::`) is resolved, once at
/// construction, to the address of the interface that carries outbound
/// traffic.
#[derive(Debug, Clone)]
pub struct ListenerLink {
    address: Option<IpAddr>,
}

impl ListenerLink {
    pub fn new(bound: SocketAddr) -> Self {
        let ip = bound.ip();
        let address = if ip.is_unspecified() {
            outbound_address(bound.is_ipv4())
        } else {
            Some(ip)
        };
        Self { address }
    }
}

fn outbound_address(ipv4: bool) -> Option<IpAddr> {
    let (bind, probe) = if ipv4 {
        ("0.0.0.0:0", "192.0.2.1:9")
    } else {
        ("[::]:0", "[2001:db8::1]:9")
    };
    // connect() on UDP only selects a route; nothing is sent
    let socket = UdpSocket::bind(bind).ok()?;
    socket.connect(probe).ok()?;
    let addr = socket.local_addr().ok()?.ip();
    debug!("[LINK] outbound interface address {}", addr);
    (!addr.is_unspecified()).then_some(addr)
}

impl LinkStatus for ListenerLink {
    fn is_connected(&self) -> bool {
        self.address.is_some()
    }

    fn local_address(&self) -> Option<IpAddr> {
        self.address
    }
}
