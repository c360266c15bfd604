//! Command dispatch for the device endpoint
//!
//! This module handles:
//! - Parsing decoded messages into commands
//! - Routing recognised names to their handlers
//! - Emitting each handler's responses, in order, through a [`Responder`]
//!
//! Unrecognised names, messages without a `command` field and malformed
//! JSON are ignored silently.

mod dispatcher;
pub mod handlers;

pub use dispatcher::{CommandDispatcher, CommandKind};

use async_trait::async_trait;
use dezero_shared::Response;

use crate::session::SessionError;

/// Outcome of handling one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Handler sent `count` responses
    Responded { count: usize },
    /// Nothing was sent to the peer
    Ignored { reason: String },
}

impl CommandResult {
    pub fn ignored(reason: impl Into<String>) -> Self {
        CommandResult::Ignored {
            reason: reason.into(),
        }
    }
}

/// Destination for the responses produced by a command
#[async_trait]
pub trait Responder: Send {
    async fn respond(&mut self, response: Response) -> Result<(), SessionError>;
}

/// Collects responses in memory
#[async_trait]
impl Responder for Vec<Response> {
    async fn respond(&mut self, response: Response) -> Result<(), SessionError> {
        self.push(response);
        Ok(())
    }
}
