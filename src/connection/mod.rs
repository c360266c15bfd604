//! Inbound connection handling for the device endpoint
//!
//! This module handles:
//! - Binding the listening socket, restarting on address-in-use
//! - Accepting peers up to the configured session limit
//! - Running one session task per accepted connection

mod listener;

pub use listener::{bind_with_retry, NodeServer};
