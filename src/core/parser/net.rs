//! NIC (`netN`) specification parsing and construction.

use std::collections::BTreeMap;

pub const DEFAULT_NET_MODEL: &str = "virtio";

/// Extracts the MAC from a net spec such as
/// `virtio=52:54:00:AA:BB:CC,bridge=vmbr1,firewall=1`, lowercased.
///
/// The `model=MAC` leading pair is preferred; an explicit `macaddr=` entry is
/// used otherwise.
pub fn mac_from_net(spec: &str) -> Option<String> {
    let mut parts = spec.split(',').map(str::trim);
    if let Some((_, value)) = parts.next().and_then(|first| first.split_once('=')) {
        if is_mac(value) {
            return Some(value.to_ascii_lowercase());
        }
    }
    spec.split(',')
        .map(str::trim)
        .filter_map(|part| part.strip_prefix("macaddr="))
        .find(|value| is_mac(value))
        .map(str::to_ascii_lowercase)
}

fn is_mac(value: &str) -> bool {
    let octets: Vec<&str> = value.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

/// MACs of every `netN` entry, in slot order.
pub fn vm_macs(config: &BTreeMap<String, String>) -> Vec<String> {
    let mut nets: Vec<(u32, &String)> = config
        .iter()
        .filter_map(|(key, value)| {
            let index = key.strip_prefix("net")?.parse::<u32>().ok()?;
            Some((index, value))
        })
        .collect();
    nets.sort_by_key(|(index, _)| *index);

    let mut macs = Vec::new();
    for (_, spec) in nets {
        if let Some(mac) = mac_from_net(spec) {
            if !macs.contains(&mac) {
                macs.push(mac);
            }
        }
    }
    macs
}

/// Builds the `net0` value: `<model>[,bridge=B][,firewall=0|1][,fwgroup=G]`.
pub fn build_net0(
    model: Option<&str>,
    bridge: Option<&str>,
    firewall: Option<bool>,
    firewall_group: Option<&str>,
) -> String {
    let mut net0 = model.unwrap_or(DEFAULT_NET_MODEL).to_string();
    if let Some(bridge) = bridge {
        net0.push_str(",bridge=");
        net0.push_str(bridge);
    }
    if let Some(firewall) = firewall {
        net0.push_str(if firewall { ",firewall=1" } else { ",firewall=0" });
    }
    if let Some(group) = firewall_group {
        net0.push_str(",fwgroup=");
        net0.push_str(group);
    }
    net0
}
