//! Command handlers for the recognised command names

mod device_info;
mod execute;
mod ping;
mod wifi_scan;

pub use device_info::handle_device_info;
pub use execute::handle_execute_script;
pub use ping::handle_ping;
pub use wifi_scan::handle_scan_wifi;

use std::sync::Arc;

use crate::delegate::ExecutionDelegate;
use crate::device::{DeviceInfoSource, NetworkScanner};

/// Collaborators shared by every handler
///
/// Handlers only read through these; no handler keeps state between
/// commands.
#[derive(Clone)]
pub struct HandlerContext {
    pub device: Arc<dyn DeviceInfoSource>,
    pub scanner: Arc<dyn NetworkScanner>,
    pub delegate: Arc<dyn ExecutionDelegate>,
    pub max_scan_results: usize,
}
