//! `execute_script` handler
//!
//! Always emits exactly three text responses: the start marker, the
//! delegate's value or a `Script Error: ...` line, and the end marker.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;
use tracing::{info, warn};

use super::HandlerContext;
use crate::command::{CommandResult, Responder};
use crate::delegate::{run_guarded, ExecutionRequest, ExecutionResult};
use crate::session::SessionError;
use dezero_shared::markers::{EXECUTION_FINISHED, EXECUTION_STARTED};
use dezero_shared::{Command, Response};

/// Run the command's program through the execution delegate
pub async fn handle_execute_script(
    ctx: &HandlerContext,
    command: &Command,
    out: &mut dyn Responder,
) -> Result<CommandResult, SessionError> {
    out.respond(Response::Text(EXECUTION_STARTED.into())).await?;

    let result = match decode_program(command) {
        Ok(program) => {
            let params = command
                .parameters
                .get("params")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let request = ExecutionRequest::new(program).with_params(params);
            run_guarded(ctx.delegate.as_ref(), request).await
        }
        Err(detail) => {
            warn!("[EXECUTE] rejected payload: {}", detail);
            ExecutionResult::failure(detail)
        }
    };

    if result.failed {
        info!("[EXECUTE] {} failed: {}", ctx.delegate.name(), result.detail);
    } else {
        info!("[EXECUTE] {} completed", ctx.delegate.name());
    }

    out.respond(Response::Text(result.into_text())).await?;
    out.respond(Response::Text(EXECUTION_FINISHED.into())).await?;
    Ok(CommandResult::Responded { count: 3 })
}

/// Undo the transport encoding of the `script` field
fn decode_program(command: &Command) -> Result<String, String> {
    let encoded = command
        .param_str("script")
        .ok_or_else(|| "missing 'script' field".to_string())?;
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|e| format!("invalid base64 payload: {}", e))?;
    String::from_utf8(raw).map_err(|_| "script is not valid UTF-8".to_string())
}
