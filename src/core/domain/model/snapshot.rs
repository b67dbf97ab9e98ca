//! VM snapshot models.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A disk-only VM snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Entry of `/nodes/{node}/qemu/{vmid}/snapshot`.
///
/// The list always carries a synthetic `current` entry describing the live
/// state; it is not a snapshot and is filtered out.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SnapshotListItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation time in seconds since the UNIX epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snaptime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl SnapshotListItem {
    pub const CURRENT: &'static str = "current";

    pub fn is_current(&self) -> bool {
        self.name == Self::CURRENT
    }

    pub fn into_snapshot(self) -> Snapshot {
        let created_at = self
            .snaptime
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Snapshot {
            name: self.name,
            description: self.description.unwrap_or_default().trim().to_string(),
            created_at,
        }
    }
}

/// Converts a raw snapshot listing into domain snapshots, dropping `current`.
pub fn snapshots_from_list(items: Vec<SnapshotListItem>) -> Vec<Snapshot> {
    items
        .into_iter()
        .filter(|item| !item.is_current())
        .map(SnapshotListItem::into_snapshot)
        .collect()
}
