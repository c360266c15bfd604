//! `scan_wifi` handler

use serde_json::json;
use tracing::{debug, warn};

use super::HandlerContext;
use crate::command::{CommandResult, Responder};
use crate::session::SessionError;
use dezero_shared::{Command, Response};

/// Reply with the first N networks the scanner reports
///
/// A failed scan sends nothing.
pub async fn handle_scan_wifi(
    ctx: &HandlerContext,
    _command: &Command,
    out: &mut dyn Responder,
) -> Result<CommandResult, SessionError> {
    let mut networks = match ctx.scanner.scan().await {
        Ok(networks) => networks,
        Err(e) => {
            warn!("[SCAN] {} scan failed: {:#}", ctx.scanner.name(), e);
            return Ok(CommandResult::ignored("scan failed"));
        }
    };

    debug!(
        "[SCAN] {} found {} networks, reporting at most {}",
        ctx.scanner.name(),
        networks.len(),
        ctx.max_scan_results
    );
    networks.truncate(ctx.max_scan_results);

    out.respond(Response::Json(json!({
        "type": "wifi_scan_results",
        "networks": networks,
    })))
    .await?;
    Ok(CommandResult::Responded { count: 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::handlers::test_support::{
        context_with, FailingScanner, FixedScanner, StubDelegate,
    };
    use crate::delegate::ExecutionResult;
    use crate::device::NetworkEntry;
    use std::sync::Arc;

    fn entry(name: &str, signal_strength: i32) -> NetworkEntry {
        NetworkEntry {
            name: name.into(),
            signal_strength,
        }
    }

    #[tokio::test]
    async fn test_first_n_encountered_not_sorted() {
        let scanned = vec![
            entry("a", -90),
            entry("b", -40),
            entry("c", -70),
            entry("d", -30),
            entry("e", -85),
            entry("f", -20),
            entry("g", -10),
        ];
        let ctx = context_with(
            Arc::new(FixedScanner(scanned)),
            Arc::new(StubDelegate::new(ExecutionResult::success(""))),
        );

        let mut out: Vec<Response> = Vec::new();
        handle_scan_wifi(&ctx, &Command::new("scan_wifi"), &mut out)
            .await
            .expect("handler");

        assert_eq!(out.len(), 1);
        let body = out[0].as_json().expect("json");
        assert_eq!(body["type"], "wifi_scan_results");
        let names: Vec<&str> = body["networks"]
            .as_array()
            .expect("array")
            .iter()
            .map(|n| n["name"].as_str().expect("name"))
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(body["networks"][0]["signal_strength"], -90);
    }

    #[tokio::test]
    async fn test_scan_failure_is_silent() {
        let ctx = context_with(
            Arc::new(FailingScanner),
            Arc::new(StubDelegate::new(ExecutionResult::success(""))),
        );

        let mut out: Vec<Response> = Vec::new();
        let result = handle_scan_wifi(&ctx, &Command::new("scan_wifi"), &mut out)
            .await
            .expect("handler");

        assert!(out.is_empty());
        assert!(matches!(result, CommandResult::Ignored { .. }));
    }
}
