//! Device information snapshot

use serde::Serialize;
use sysinfo::System;

/// Point-in-time view of the device reported by `get_device_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub identifier: String,
    pub firmware_version: String,
    /// CPU frequency in MHz
    pub cpu_freq: u64,
    /// Bytes of RAM in use; never exceeds `ram_total`
    pub ram_used: u64,
    pub ram_total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flash_total: Option<u64>,
}

impl DeviceSnapshot {
    /// Build a snapshot, clamping `ram_used` to `ram_total`
    pub fn new(
        identifier: impl Into<String>,
        firmware_version: impl Into<String>,
        cpu_freq: u64,
        ram_used: u64,
        ram_total: u64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            firmware_version: firmware_version.into(),
            cpu_freq,
            ram_used: ram_used.min(ram_total),
            ram_total,
            flash_total: None,
        }
    }
}

/// Source of device snapshots
pub trait DeviceInfoSource: Send + Sync {
    fn snapshot(&self) -> DeviceSnapshot;
}

/// Snapshot source backed by the host's live system statistics
#[derive(Debug, Clone)]
pub struct SystemInfoSource {
    identifier: String,
    firmware_version: String,
    flash_total: Option<u64>,
}

impl SystemInfoSource {
    /// Create a source; an empty identifier falls back to the host name
    pub fn new(identifier: &str, firmware_version: &str, flash_total: Option<u64>) -> Self {
        let identifier = if identifier.is_empty() {
            System::host_name().unwrap_or_else(|| "unknown".into())
        } else {
            identifier.to_string()
        };
        Self {
            identifier,
            firmware_version: firmware_version.to_string(),
            flash_total,
        }
    }
}

impl DeviceInfoSource for SystemInfoSource {
    fn snapshot(&self) -> DeviceSnapshot {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        let cpu_freq = sys.cpus().first().map(|cpu| cpu.frequency()).unwrap_or(0);

        let mut snapshot = DeviceSnapshot::new(
            &self.identifier,
            &self.firmware_version,
            cpu_freq,
            sys.used_memory(),
            sys.total_memory(),
        );
        snapshot.flash_total = self.flash_total;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ram_used_is_clamped() {
        let snap = DeviceSnapshot::new("dev", "1.0", 240, 900, 500);
        assert_eq!(snap.ram_used, 500);
        assert_eq!(snap.ram_total, 500);
    }

    #[test]
    fn test_flash_total_omitted_when_unknown() {
        let snap = DeviceSnapshot::new("dev", "1.0", 240, 100, 500);
        let value = serde_json::to_value(&snap).expect("serialize");
        assert_eq!(
            value,
            json!({
                "identifier": "dev",
                "firmware_version": "1.0",
                "cpu_freq": 240,
                "ram_used": 100,
                "ram_total": 500,
            })
        );
    }

    #[test]
    fn test_system_snapshot_is_consistent() {
        let source = SystemInfoSource::new("edge-7", "9.0", Some(4_194_304));
        let snap = source.snapshot();

        assert_eq!(snap.identifier, "edge-7");
        assert_eq!(snap.firmware_version, "9.0");
        assert_eq!(snap.flash_total, Some(4_194_304));
        assert!(snap.ram_used <= snap.ram_total);
    }

    #[test]
    fn test_empty_identifier_falls_back() {
        let source = SystemInfoSource::new("", "9.0", None);
        assert!(!source.snapshot().identifier.is_empty());
    }
}
