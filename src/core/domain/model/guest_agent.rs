//! Wire types for the QEMU guest agent `network-get-interfaces` command.

use serde::{Deserialize, Serialize};

/// Response of `/nodes/{node}/qemu/{vmid}/agent/network-get-interfaces`.
///
/// The API wraps the interface list in `{"result": [...]}`; `qm guest cmd`
/// prints the bare list. Both decode through [`AgentNetworkResponse::interfaces`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AgentNetworkResponse {
    Wrapped { result: Vec<AgentInterface> },
    Bare(Vec<AgentInterface>),
}

impl AgentNetworkResponse {
    pub fn interfaces(self) -> Vec<AgentInterface> {
        match self {
            AgentNetworkResponse::Wrapped { result } => result,
            AgentNetworkResponse::Bare(list) => list,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AgentInterface {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_address: Option<String>,
    #[serde(default)]
    pub ip_addresses: Vec<AgentIpAddress>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AgentIpAddress {
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<u8>,
}

/// Flattens every reported address string, in interface order.
pub fn reported_addresses(interfaces: &[AgentInterface]) -> Vec<&str> {
    interfaces
        .iter()
        .flat_map(|iface| iface.ip_addresses.iter())
        .map(|addr| addr.ip_address.as_str())
        .collect()
}
