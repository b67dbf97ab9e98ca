//! Domain models for QEMU virtual machine operations.
//!
//! This module defines the structures used when interacting with VMs via the
//! Proxmox API or the `qm` tool.

use serde::{Deserialize, Serialize};

/// Hypervisor-assigned VM identifier.
pub type VmId = u32;

/// Coarse run state of a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Running,
    Stopped,
    Unknown,
}

impl VmStatus {
    /// Maps a remote status string, case-insensitively.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "running" => VmStatus::Running,
            "stopped" => VmStatus::Stopped,
            _ => VmStatus::Unknown,
        }
    }
}

impl std::fmt::Display for VmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VmStatus::Running => "running",
            VmStatus::Stopped => "stopped",
            VmStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Point-in-time resource usage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VmStats {
    /// CPU usage as a fraction; multi-core guests can report above 1.0.
    pub cpu_usage: f64,
}

/// Tunable parameters applied by `configure`.
///
/// Every field is optional; `None` (and empty strings) leave the remote
/// value untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub name: Option<String>,
    pub cores: Option<u32>,
    pub memory_mb: Option<u32>,
    pub bridge: Option<String>,
    /// NIC model, `virtio` when a network change is requested without one.
    pub net_model: Option<String>,
    /// Cloud-init snippet in storage-reference form (`local:snippets/x.yaml`).
    pub cloud_init: Option<String>,
    /// Host cpulist the vCPUs are pinned to, e.g. `0-3,8`.
    pub cpu_pinning: Option<String>,
    pub scsihw: Option<String>,
    /// Minimum root disk size; the disk is grown, never shrunk.
    pub root_disk_gb: Option<u32>,
    /// Root disk slot; auto-detected from the VM config when unset.
    pub root_disk: Option<String>,
    /// `Some(true)`/`Some(false)` toggles the NIC firewall, `None` leaves it.
    pub firewall: Option<bool>,
    pub firewall_group: Option<String>,
}

/// Trims and drops empty strings so callers can pass `Some("")` as "unset".
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl VmConfig {
    pub fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    pub fn bridge(&self) -> Option<&str> {
        non_empty(&self.bridge)
    }

    pub fn net_model(&self) -> Option<&str> {
        non_empty(&self.net_model)
    }

    pub fn cloud_init(&self) -> Option<&str> {
        non_empty(&self.cloud_init)
    }

    pub fn cpu_pinning(&self) -> Option<&str> {
        non_empty(&self.cpu_pinning)
    }

    pub fn scsihw(&self) -> Option<&str> {
        non_empty(&self.scsihw)
    }

    pub fn root_disk(&self) -> Option<&str> {
        non_empty(&self.root_disk)
    }

    pub fn firewall_group(&self) -> Option<&str> {
        non_empty(&self.firewall_group)
    }

    /// True when any NIC-related field is set and `net0` must be rewritten.
    pub fn touches_network(&self) -> bool {
        self.bridge().is_some()
            || self.net_model().is_some()
            || self.firewall.is_some()
            || self.firewall_group().is_some()
    }
}

/// Detailed runtime status of a VM from `/nodes/{node}/qemu/{vmid}/status/current`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VmStatusCurrent {
    /// Current VM status (e.g., "running", "stopped").
    pub status: String,
    /// VM name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// CPU usage fraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    /// Number of vCPUs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    /// Memory usage in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<u64>,
    /// Uptime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    /// QEMU process status (e.g., "running", "paused").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qmpstatus: Option<String>,
}
