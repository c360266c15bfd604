//! Two-line status display

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::LinkStatus;

/// Characters per display line
pub const DISPLAY_WIDTH: usize = 16;

/// Sink for two short lines of status text
pub trait StatusDisplay: Send + Sync {
    fn show(&self, line1: &str, line2: &str);
}

/// Display that writes to the log instead of a panel
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn show(&self, line1: &str, line2: &str) {
        info!("[DISPLAY] {} | {}", line1, line2);
    }
}

/// Keep at most [`DISPLAY_WIDTH`] characters
pub fn truncate_line(line: &str) -> &str {
    match line.char_indices().nth(DISPLAY_WIDTH) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// Serialised access to the display shared by all sessions
#[derive(Clone)]
pub struct StatusBoard {
    display: Arc<Mutex<Box<dyn StatusDisplay>>>,
    link: Arc<dyn LinkStatus>,
}

impl StatusBoard {
    pub fn new(display: Box<dyn StatusDisplay>, link: Arc<dyn LinkStatus>) -> Self {
        Self {
            display: Arc::new(Mutex::new(display)),
            link,
        }
    }

    /// Show two lines, truncated to the display width
    pub async fn show(&self, line1: &str, line2: &str) {
        let display = self.display.lock().await;
        display.show(truncate_line(line1), truncate_line(line2));
    }

    /// A peer has connected
    pub async fn client_connected(&self, peer: &str) {
        self.show("CLIENT CONNECTED", peer).await;
    }

    /// Waiting for a client; shows the address peers should use
    pub async fn ready(&self) {
        match self.link.local_address() {
            Some(addr) if self.link.is_connected() => self.show("READY", &addr.to_string()).await,
            _ => self.show("NO LINK", "").await,
        }
    }
}
