//! Device capability queries
//!
//! Read-only collaborators consulted by the built-in command handlers:
//! - Hardware snapshot (identifier, firmware, CPU, memory)
//! - Wi-Fi network scan

mod info;
mod scan;

pub use info::{DeviceInfoSource, DeviceSnapshot, SystemInfoSource};
pub use scan::{parse_nmcli, NetworkEntry, NetworkScanner, NmcliScanner, NoScanner};
