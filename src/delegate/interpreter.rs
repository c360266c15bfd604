//! External interpreter delegate
//!
//! Runs a configured interpreter with the program on stdin. The child gets
//! a cleared environment plus a small allowlist, the request params as JSON
//! in `DEZERO_PARAMS`, and is killed if it outlives the time limit or the
//! future is dropped.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

use super::{ExecutionDelegate, ExecutionRequest, ExecutionResult};

/// Variables inherited from the node's environment
pub const ALLOWED_ENV_VARS: &[&str] = &["PATH", "HOME", "LANG", "TMPDIR"];

/// Variable carrying the request params
pub const PARAMS_ENV_VAR: &str = "DEZERO_PARAMS";

/// Delegate backed by an interpreter subprocess
#[derive(Debug, Clone)]
pub struct InterpreterDelegate {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl InterpreterDelegate {
    /// `command` is the interpreter argv; it must not be empty
    pub fn new(command: &[String], timeout: Duration) -> anyhow::Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("interpreter command is empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    async fn run(&self, request: ExecutionRequest) -> std::io::Result<std::process::Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        cmd.env(PARAMS_ENV_VAR, Value::Object(request.params).to_string());

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.program.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        child.wait_with_output().await
    }
}

#[async_trait]
impl ExecutionDelegate for InterpreterDelegate {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let output = match tokio::time::timeout(self.timeout, self.run(request)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("[DELEGATE] failed to run {}: {}", self.program, e);
                return ExecutionResult::failure(format!("failed to run {}: {}", self.program, e));
            }
            Err(_) => {
                warn!(
                    "[DELEGATE] {} exceeded {} ms, killed",
                    self.program,
                    self.timeout.as_millis()
                );
                return ExecutionResult::failure(format!(
                    "execution timed out after {} ms",
                    self.timeout.as_millis()
                ));
            }
        };

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            ExecutionResult::success(stdout.trim_end_matches(['\r', '\n']))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                ExecutionResult::failure(format!("interpreter exited with {}", output.status))
            } else {
                ExecutionResult::failure(stderr)
            }
        }
    }

    fn name(&self) -> &'static str {
        "interpreter"
    }
}
