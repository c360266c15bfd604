//! Node configuration parsing and validation
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! a working node listening on `0.0.0.0:8888`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::session::SessionConfig;
use dezero_shared::limits;

/// Listener restart policy
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ListenerConfig {
    /// Bind attempts after the first fails with address-in-use
    #[serde(default = "default_bind_retries")]
    pub bind_retries: u32,
    #[serde(default = "default_bind_retry_delay_ms")]
    pub bind_retry_delay_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_retries: default_bind_retries(),
            bind_retry_delay_ms: default_bind_retry_delay_ms(),
        }
    }
}

/// Which network scanner to use
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScannerKind {
    #[default]
    None,
    Nmcli,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ScannerConfig {
    #[serde(default)]
    pub kind: ScannerKind,
    /// Networks reported per scan (first N encountered)
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            kind: ScannerKind::default(),
            max_results: default_max_results(),
        }
    }
}

/// Which execution delegate to use
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DelegateKind {
    #[default]
    Tools,
    Interpreter,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DelegateConfig {
    #[serde(default)]
    pub kind: DelegateKind,
    /// Interpreter argv, e.g. `["python3", "-"]`
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_delegate_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            kind: DelegateKind::default(),
            command: Vec::new(),
            timeout_ms: default_delegate_timeout_ms(),
        }
    }
}

/// Node configuration parsed from TOML
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NodeConfig {
    /// Identifier reported by `get_device_info`
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
    /// Flash size in bytes, if known
    #[serde(default)]
    pub flash_total: Option<u64>,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_max_payload")]
    pub max_frame_payload: usize,
    #[serde(default = "default_max_payload")]
    pub max_line_bytes: usize,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub delegate: DelegateConfig,
}

fn default_device_id() -> String {
    "dezero-001".into()
}

fn default_firmware_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}

fn default_listen() -> String {
    "0.0.0.0:8888".into()
}

fn default_max_sessions() -> usize {
    1
}

fn default_handshake_timeout_ms() -> u64 {
    limits::HANDSHAKE_TIMEOUT_MS
}

fn default_max_payload() -> usize {
    limits::MAX_PAYLOAD_SIZE
}

fn default_bind_retries() -> u32 {
    5
}

fn default_bind_retry_delay_ms() -> u64 {
    2000
}

fn default_max_results() -> usize {
    limits::MAX_SCAN_RESULTS
}

fn default_delegate_timeout_ms() -> u64 {
    limits::MAX_EXECUTION_TIME_MS
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            firmware_version: default_firmware_version(),
            flash_total: None,
            listen: default_listen(),
            max_sessions: default_max_sessions(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_frame_payload: default_max_payload(),
            max_line_bytes: default_max_payload(),
            listener: ListenerConfig::default(),
            scanner: ScannerConfig::default(),
            delegate: DelegateConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            bail!("max_sessions must be greater than zero");
        }
        if self.max_frame_payload == 0 || self.max_line_bytes == 0 {
            bail!("max_frame_payload and max_line_bytes must be greater than zero");
        }
        if self.handshake_timeout_ms == 0 {
            bail!("handshake_timeout_ms must be greater than zero");
        }
        if self.delegate.kind == DelegateKind::Interpreter && self.delegate.command.is_empty() {
            bail!("delegate.command must be set for the interpreter delegate");
        }
        Ok(())
    }

    /// Limits handed to every session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            max_frame_payload: self.max_frame_payload,
            max_line_bytes: self.max_line_bytes,
            ..SessionConfig::default()
        }
    }

    pub fn delegate_timeout(&self) -> Duration {
        Duration::from_millis(self.delegate.timeout_ms)
    }

    pub fn bind_retry_delay(&self) -> Duration {
        Duration::from_millis(self.listener.bind_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("config");
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.listen, "0.0.0.0:8888");
        assert_eq!(config.max_sessions, 1);
        assert_eq!(config.scanner.max_results, 5);
        assert_eq!(config.delegate.timeout_ms, 60_000);
        assert_eq!(config.firmware_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_full_config() {
        let raw = r#"
            device_id = "bench-7"
            flash_total = 4194304
            listen = "127.0.0.1:9000"
            max_sessions = 2
            handshake_timeout_ms = 2500

            [listener]
            bind_retries = 1

            [scanner]
            kind = "nmcli"
            max_results = 3

            [delegate]
            kind = "interpreter"
            command = ["python3", "-"]
            timeout_ms = 1000
        "#;
        let config = NodeConfig::from_toml_str(raw).expect("config");

        assert_eq!(config.device_id, "bench-7");
        assert_eq!(config.flash_total, Some(4_194_304));
        assert_eq!(config.listener.bind_retries, 1);
        assert_eq!(config.listener.bind_retry_delay_ms, 2000);
        assert_eq!(config.scanner.kind, ScannerKind::Nmcli);
        assert_eq!(config.delegate.kind, DelegateKind::Interpreter);
        assert_eq!(config.delegate_timeout(), Duration::from_secs(1));
        assert_eq!(
            config.session_config().handshake_timeout,
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_validation_failures() {
        assert!(NodeConfig::from_toml_str("max_sessions = 0").is_err());
        assert!(NodeConfig::from_toml_str("max_line_bytes = 0").is_err());
        assert!(NodeConfig::from_toml_str("[delegate]\nkind = \"interpreter\"").is_err());
        assert!(NodeConfig::from_toml_str("[scanner]\nkind = \"bluetooth\"").is_err());
    }
}
