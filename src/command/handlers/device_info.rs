//! `get_device_info` handler

use serde_json::json;
use tracing::debug;

use super::HandlerContext;
use crate::command::{CommandResult, Responder};
use crate::session::SessionError;
use dezero_shared::{Command, Response};

/// Reply with one `device_info` object
pub async fn handle_device_info(
    ctx: &HandlerContext,
    _command: &Command,
    out: &mut dyn Responder,
) -> Result<CommandResult, SessionError> {
    let snapshot = ctx.device.snapshot();
    debug!(
        "[DEVICE_INFO] {} ram {}/{}",
        snapshot.identifier, snapshot.ram_used, snapshot.ram_total
    );

    let mut info = json!({
        "type": "device_info",
        "identifier": snapshot.identifier,
        "firmware_version": snapshot.firmware_version,
        "cpu_freq": snapshot.cpu_freq,
        "ram_used": snapshot.ram_used,
        "ram_total": snapshot.ram_total,
    });
    if let Some(flash_total) = snapshot.flash_total {
        info["flash_total"] = json!(flash_total);
    }

    out.respond(Response::Json(info)).await?;
    Ok(CommandResult::Responded { count: 1 })
}
