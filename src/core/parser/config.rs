//! Parsers for the hypervisor's key/value VM configuration.

use std::collections::BTreeMap;

/// Slots probed, in order, when the root disk must be auto-detected.
pub const ROOT_DISK_CANDIDATES: [&str; 4] = ["scsi0", "virtio0", "sata0", "ide0"];

/// Parses `qm config` output (`key: value` per line).
///
/// Empty lines and lines without a colon are dropped; keys and values are
/// trimmed.
pub fn parse_config_lines(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Normalizes an API config object (`.data` of `GET .../config`) to strings.
///
/// Numbers keep their JSON rendering, booleans become `1`/`0` (the
/// hypervisor's own encoding), nulls are dropped and nested values are kept
/// as compact JSON.
pub fn normalize_config_map(
    data: &serde_json::Map<String, serde_json::Value>,
) -> BTreeMap<String, String> {
    data.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

/// Returns the root disk slot of a VM config, or `None` when nothing fits.
///
/// Order: explicit `bootdisk`, then the first candidate slot in `boot`'s
/// `order=` list, then the first candidate slot present in the config.
pub fn detect_root_disk(config: &BTreeMap<String, String>) -> Option<String> {
    if let Some(bootdisk) = config.get("bootdisk").map(|v| v.trim()) {
        if !bootdisk.is_empty() {
            return Some(bootdisk.to_string());
        }
    }

    if let Some(boot) = config.get("boot") {
        for part in boot.split(',') {
            let Some(order) = part.trim().strip_prefix("order=") else {
                continue;
            };
            let found = order
                .split([';', ' '])
                .map(str::trim)
                .find(|entry| ROOT_DISK_CANDIDATES.contains(entry));
            if let Some(slot) = found {
                return Some(slot.to_string());
            }
        }
    }

    ROOT_DISK_CANDIDATES
        .iter()
        .find(|slot| config.contains_key(**slot))
        .map(|slot| slot.to_string())
}

/// Interprets an `agent` property string.
///
/// Accepted forms: `1`, `0`, `1,fstrim_cloned_disks=1`, `enabled=1,...`,
/// `disabled=1`. An explicit `enabled=` key wins; a lone `disabled=1`
/// disables; any other non-empty value counts as enabled.
pub fn agent_enabled(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }

    let mut bare = None;
    let mut enabled = None;
    let mut disabled = false;
    for part in value.split(',').map(str::trim) {
        match part.split_once('=') {
            Some((key, val)) => match key.trim() {
                "enabled" => enabled = Some(truthy(val)),
                "disabled" => disabled = truthy(val),
                _ => {}
            },
            None if bare.is_none() => bare = Some(truthy(part)),
            None => {}
        }
    }

    if let Some(enabled) = enabled {
        return enabled;
    }
    if disabled {
        return false;
    }
    bare.unwrap_or(true)
}

fn truthy(value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        other => other.parse::<f64>().map(|f| f != 0.0).unwrap_or(false),
    }
}

/// True when any config value references a cloud-init drive.
pub fn has_cloud_init_drive(config: &BTreeMap<String, String>) -> bool {
    config
        .values()
        .any(|value| value.to_ascii_lowercase().contains("cloudinit"))
}

/// Normalizes a `cicustom` value: pass through `user=...`-style values,
/// otherwise treat the input as the user-data reference.
pub fn cicustom_value(reference: &str) -> String {
    let reference = reference.trim();
    if reference.contains('=') {
        reference.to_string()
    } else {
        format!("user={}", reference)
    }
}
