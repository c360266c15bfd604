//! Named built-in operations selected by the program's declared tool

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use super::{ExecutionDelegate, ExecutionRequest, ExecutionResult};
use crate::device::DeviceInfoSource;

const TOOL_DECLARATION: &str = "tool:";

/// Delegate that maps a `tool: <name>` declaration to a built-in
///
/// The first line that is neither blank nor a `#` comment must be the
/// declaration; everything after it is the tool's body.
///
/// | tool | value |
/// |---|---|
/// | `echo` | the body, trimmed |
/// | `device_info` | device snapshot as JSON |
/// | `params` | request params as JSON |
/// | `uptime` | whole seconds since the node started |
pub struct ToolTable {
    device: Arc<dyn DeviceInfoSource>,
    started: Instant,
}

impl ToolTable {
    pub fn new(device: Arc<dyn DeviceInfoSource>) -> Self {
        Self {
            device,
            started: Instant::now(),
        }
    }

    fn run(&self, tool: &str, body: &str, request: &ExecutionRequest) -> ExecutionResult {
        match tool {
            "echo" => ExecutionResult::success(body.trim()),
            "device_info" => match serde_json::to_string(&self.device.snapshot()) {
                Ok(json) => ExecutionResult::success(json),
                Err(e) => ExecutionResult::failure(e.to_string()),
            },
            "params" => ExecutionResult::success(Value::Object(request.params.clone()).to_string()),
            "uptime" => ExecutionResult::success(self.started.elapsed().as_secs().to_string()),
            other => ExecutionResult::failure(format!("unknown tool '{}'", other)),
        }
    }
}

#[async_trait]
impl ExecutionDelegate for ToolTable {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        match split_declaration(&request.program) {
            Some((tool, body)) => self.run(tool, body, &request),
            None => ExecutionResult::failure("no 'tool:' declaration found"),
        }
    }

    fn name(&self) -> &'static str {
        "tools"
    }
}

/// Find the declaration line; returns the tool name and the remaining body
fn split_declaration(program: &str) -> Option<(&str, &str)> {
    let mut rest = program;
    loop {
        if rest.is_empty() {
            return None;
        }
        let (line, next) = match rest.find('\n') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => (rest, ""),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            rest = next;
            continue;
        }
        let name = trimmed.strip_prefix(TOOL_DECLARATION)?.trim();
        if name.is_empty() {
            return None;
        }
        return Some((name, next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceSnapshot;
    use serde_json::{json, Map};

    struct FixedDevice;

    impl DeviceInfoSource for FixedDevice {
        fn snapshot(&self) -> DeviceSnapshot {
            DeviceSnapshot::new("fixed", "1.2.3", 160, 10, 20)
        }
    }

    fn table() -> ToolTable {
        ToolTable::new(Arc::new(FixedDevice))
    }

    #[test]
    fn test_split_declaration_skips_comments() {
        let program = "\n# blink the led\n  tool: echo \nhello\nworld\n";
        assert_eq!(split_declaration(program), Some(("echo", "hello\nworld\n")));
    }

    #[test]
    fn test_split_declaration_requires_first_statement() {
        assert_eq!(split_declaration("print('x')\ntool: echo\n"), None);
        assert_eq!(split_declaration("# only comments\n"), None);
        assert_eq!(split_declaration("tool:\n"), None);
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let result = table().execute(ExecutionRequest::new("tool: echo\n hi there \n")).await;
        assert_eq!(result, ExecutionResult::success("hi there"));
    }

    #[tokio::test]
    async fn test_params_tool_passes_params_through() {
        let mut params = Map::new();
        params.insert("LED_PIN".into(), json!(2));
        let request = ExecutionRequest::new("tool: params").with_params(params);

        let result = table().execute(request).await;
        assert!(!result.failed);
        assert_eq!(result.value, r#"{"LED_PIN":2}"#);
    }

    #[tokio::test]
    async fn test_device_info_tool() {
        let result = table().execute(ExecutionRequest::new("tool: device_info")).await;
        let value: Value = serde_json::from_str(&result.value).expect("json");
        assert_eq!(value["identifier"], "fixed");
        assert_eq!(value["ram_total"], 20);
    }

    #[tokio::test]
    async fn test_missing_and_unknown_tools_fail() {
        let missing = table().execute(ExecutionRequest::new("import os")).await;
        assert!(missing.failed);
        assert_eq!(missing.detail, "no 'tool:' declaration found");

        let unknown = table().execute(ExecutionRequest::new("tool: reboot")).await;
        assert!(unknown.failed);
        assert_eq!(unknown.detail, "unknown tool 'reboot'");
    }
}
