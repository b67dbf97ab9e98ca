//! Domain model for node list items from the `/nodes` endpoint.
//!
//! Used once per backend to auto-detect the node when none is configured.

use serde::{Deserialize, Serialize};

/// A node in the Proxmox cluster as returned by `/api2/json/nodes`
/// (or `pvesh get /nodes --output-format json`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeListItem {
    /// The node name (e.g., "pve1").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Alternate name field some versions emit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Current node status (e.g., "online", "offline", "unknown").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl NodeListItem {
    /// The node name, preferring `node` over `name`.
    pub fn node_name(&self) -> Option<&str> {
        [self.node.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
    }
}

/// Picks the first entry's node name.
pub fn first_node_name(nodes: &[NodeListItem]) -> Option<String> {
    nodes.first().and_then(NodeListItem::node_name).map(str::to_string)
}
