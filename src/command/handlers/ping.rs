//! `ping` handler

use serde_json::json;

use super::HandlerContext;
use crate::command::{CommandResult, Responder};
use crate::session::SessionError;
use dezero_shared::{now_ms, Command, Response};

/// Reply with a timestamped pong
pub async fn handle_ping(
    _ctx: &HandlerContext,
    _command: &Command,
    out: &mut dyn Responder,
) -> Result<CommandResult, SessionError> {
    out.respond(Response::Json(json!({
        "type": "pong",
        "timestamp_ms": now_ms(),
    })))
    .await?;
    Ok(CommandResult::Responded { count: 1 })
}
