//! Delegated program execution
//!
//! An [`ExecutionDelegate`] receives the decoded body of an
//! `execute_script` command and reports either a value or an error
//! description. Two implementations ship with the node:
//! - [`ToolTable`]: fixed table of named built-in operations
//! - [`InterpreterDelegate`]: external interpreter subprocess
//!
//! Delegates never fail the session: every failure, panics included, comes
//! back as an [`ExecutionResult`] with `failed` set.

mod interpreter;
mod tools;

pub use interpreter::InterpreterDelegate;
pub use tools::ToolTable;

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use dezero_shared::markers::SCRIPT_ERROR_PREFIX;
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, error};

/// Program handed to a delegate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionRequest {
    /// Decoded program text
    pub program: String,
    /// Caller-supplied parameters, passed through untouched
    pub params: Map<String, Value>,
}

impl ExecutionRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            params: Map::new(),
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }
}

/// Outcome of one delegated execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub value: String,
    pub failed: bool,
    /// Failure description; empty on success
    pub detail: String,
}

impl ExecutionResult {
    pub fn success(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            failed: false,
            detail: String::new(),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        let mut detail = detail.into();
        if detail.trim().is_empty() {
            detail = "unknown error".into();
        }
        Self {
            value: String::new(),
            failed: true,
            detail,
        }
    }

    /// Line reported to the peer between the execution markers
    ///
    /// A multi-line failure detail (a traceback, say) is folded onto one
    /// line so a failure always occupies exactly one response line.
    pub fn into_text(self) -> String {
        if self.failed {
            format!("{}{}", SCRIPT_ERROR_PREFIX, single_line(&self.detail))
        } else {
            self.value
        }
    }
}

/// Join the non-blank lines of `text` with `" | "`
fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Runs a supplied program and reports its outcome
#[async_trait]
pub trait ExecutionDelegate: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Run a delegate, converting a panic into a failure result
pub async fn run_guarded(
    delegate: &dyn ExecutionDelegate,
    request: ExecutionRequest,
) -> ExecutionResult {
    debug!(
        "[DELEGATE] {} executing {} byte program",
        delegate.name(),
        request.program.len()
    );

    match AssertUnwindSafe(delegate.execute(request)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "delegate panicked".into());
            error!("[DELEGATE] {} panicked: {}", delegate.name(), reason);
            ExecutionResult::failure(format!("delegate panicked: {}", reason))
        }
    }
}
