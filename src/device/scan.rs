//! Wi-Fi network scanning

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

/// One discovered network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEntry {
    pub name: String,
    /// Signal strength in dBm
    pub signal_strength: i32,
}

/// Source of nearby network lists
///
/// Results are reported in the order the radio produced them; callers
/// truncate to the first N without sorting.
#[async_trait]
pub trait NetworkScanner: Send + Sync {
    async fn scan(&self) -> Result<Vec<NetworkEntry>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Scanner for hosts without a radio: always reports no networks
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScanner;

#[async_trait]
impl NetworkScanner for NoScanner {
    async fn scan(&self) -> Result<Vec<NetworkEntry>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Scanner backed by NetworkManager's `nmcli`
#[derive(Debug, Clone)]
pub struct NmcliScanner {
    program: String,
}

impl NmcliScanner {
    pub fn new() -> Self {
        Self {
            program: "nmcli".into(),
        }
    }
}

impl Default for NmcliScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkScanner for NmcliScanner {
    async fn scan(&self) -> Result<Vec<NetworkEntry>> {
        let output = Command::new(&self.program)
            .args(["-t", "-f", "SSID,SIGNAL", "device", "wifi", "list"])
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let entries = parse_nmcli(&stdout);
        debug!("[SCAN] nmcli reported {} networks", entries.len());
        Ok(entries)
    }

    fn name(&self) -> &'static str {
        "nmcli"
    }
}

/// Parse `nmcli -t -f SSID,SIGNAL` output
///
/// Each line is `<ssid>:<quality>` where `:` inside the SSID is escaped as
/// `\:`. Hidden networks (empty SSID) and lines without a numeric quality
/// are skipped. Quality 0..=100 maps to dBm as `quality / 2 - 100`.
pub fn parse_nmcli(output: &str) -> Vec<NetworkEntry> {
    output
        .lines()
        .filter_map(|line| {
            let (ssid, quality) = split_terse(line)?;
            if ssid.is_empty() {
                return None;
            }
            let quality: i32 = quality.trim().parse().ok()?;
            Some(NetworkEntry {
                name: ssid,
                signal_strength: quality.clamp(0, 100) / 2 - 100,
            })
        })
        .collect()
}

/// Split a terse-mode line at its last unescaped `:`
fn split_terse(line: &str) -> Option<(String, &str)> {
    let bytes = line.as_bytes();
    let mut split_at = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b':' => {
                split_at = Some(i);
                i += 1;
            }
            _ => i += 1,
        }
    }
    let pos = split_at?;

    let mut ssid = String::with_capacity(pos);
    let mut chars = line[..pos].chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                ssid.push(escaped);
            }
        } else {
            ssid.push(c);
        }
    }
    Some((ssid, &line[pos + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nmcli_keeps_radio_order() {
        let out = "HomeNet:70\nCafe:100\nOffice:40\n";
        let entries = parse_nmcli(out);

        assert_eq!(
            entries,
            vec![
                NetworkEntry { name: "HomeNet".into(), signal_strength: -65 },
                NetworkEntry { name: "Cafe".into(), signal_strength: -50 },
                NetworkEntry { name: "Office".into(), signal_strength: -80 },
            ]
        );
    }

    #[test]
    fn test_parse_nmcli_unescapes_colons() {
        let entries = parse_nmcli("my\\:net\\\\x:50\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "my:net\\x");
        assert_eq!(entries[0].signal_strength, -75);
    }

    #[test]
    fn test_parse_nmcli_skips_hidden_and_garbage() {
        let entries = parse_nmcli(":80\nno-quality\nBad:abc\nOk:0\n");
        assert_eq!(
            entries,
            vec![NetworkEntry { name: "Ok".into(), signal_strength: -100 }]
        );
    }

    #[tokio::test]
    async fn test_no_scanner_is_empty() {
        let entries = NoScanner.scan().await.expect("scan");
        assert!(entries.is_empty());
        assert_eq!(NoScanner.name(), "none");
    }
}
