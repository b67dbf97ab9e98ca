//! Storage volume models.

use serde::{Deserialize, Serialize};

/// Location details of a storage volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Canonical `storage:name` identifier.
    pub volume_id: String,
    pub storage: String,
    /// Host filesystem path (block device or file).
    pub path: String,
}

/// Attributes returned by `/nodes/{node}/storage/{storage}/content/{volume}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VolumeContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Status of a storage from `/nodes/{node}/storage/{storage}/status`
/// or `pvesm status --output-format json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    /// Storage plugin type (e.g., `dir`, `zfspool`, `lvmthin`).
    #[serde(rename = "type")]
    pub storage_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avail: Option<u64>,
}

/// Storage types on which volume snapshots and clones are supported.
pub const ZFS_STORAGE_TYPES: [&str; 2] = ["zfspool", "zfs"];

pub fn is_zfs_storage_type(storage_type: &str) -> bool {
    let normalized = storage_type.trim().to_ascii_lowercase();
    ZFS_STORAGE_TYPES.contains(&normalized.as_str())
}
