//! Command dispatcher - parses messages and routes them to handlers

use tracing::{debug, info};

use super::handlers::{self, HandlerContext};
use super::{CommandResult, Responder};
use crate::session::SessionError;
use dezero_shared::{commands, Command};

/// Recognised command names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    DeviceInfo,
    ScanWifi,
    ExecuteScript,
    Ping,
}

impl CommandKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            commands::GET_DEVICE_INFO => Some(CommandKind::DeviceInfo),
            commands::SCAN_WIFI => Some(CommandKind::ScanWifi),
            commands::EXECUTE_SCRIPT => Some(CommandKind::ExecuteScript),
            commands::PING => Some(CommandKind::Ping),
            _ => None,
        }
    }
}

/// Routes decoded messages to the built-in handlers
///
/// Holds no per-session state; one dispatcher serves every session.
pub struct CommandDispatcher {
    ctx: HandlerContext,
}

impl CommandDispatcher {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Handle one decoded message, sending its responses through `out`
    ///
    /// Only a failure to deliver a response is an error; everything the
    /// peer got wrong ends as [`CommandResult::Ignored`].
    pub async fn dispatch(
        &self,
        message: &[u8],
        out: &mut dyn Responder,
    ) -> Result<CommandResult, SessionError> {
        let command = match Command::parse(message) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!("[DISPATCH] message without a command field ignored");
                return Ok(CommandResult::ignored("no command field"));
            }
            Err(e) => {
                debug!("[DISPATCH] malformed message ignored: {}", e);
                return Ok(CommandResult::ignored("malformed JSON"));
            }
        };

        let Some(kind) = CommandKind::from_name(&command.name) else {
            debug!("[DISPATCH] unknown command '{}' ignored", command.name);
            return Ok(CommandResult::ignored("unknown command"));
        };

        info!("[DISPATCH] {}", command.name);

        match kind {
            CommandKind::DeviceInfo => handlers::handle_device_info(&self.ctx, &command, out).await,
            CommandKind::ScanWifi => handlers::handle_scan_wifi(&self.ctx, &command, out).await,
            CommandKind::ExecuteScript => {
                handlers::handle_execute_script(&self.ctx, &command, out).await
            }
            CommandKind::Ping => handlers::handle_ping(&self.ctx, &command, out).await,
        }
    }
}
