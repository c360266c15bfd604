//! Status collaborators
//!
//! The node reports its state on a two-line display and asks a link
//! provider for its reachable address when it becomes ready for a client.

mod display;
mod link;

pub use display::{truncate_line, LogDisplay, StatusBoard, StatusDisplay, DISPLAY_WIDTH};
pub use link::{LinkStatus, ListenerLink};
