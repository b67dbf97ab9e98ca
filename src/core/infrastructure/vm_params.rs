//! Parameter sets shared by both transports.
//!
//! The API sends these as form fields, the CLI as `--key value` pairs, so
//! both build them here and cannot drift apart.

use crate::core::domain::error::{BackendError, BackendResult, ValidationError};
use crate::core::domain::model::vm::VmConfig;
use crate::core::parser::config::{agent_enabled, cicustom_value, has_cloud_init_drive};
use crate::core::parser::net::build_net0;
use std::collections::BTreeMap;

/// Hypervisor parameters for the set fields of `config`, in a stable order.
///
/// `with_firewall_group` is false on the retry after the hypervisor
/// rejected the `fwgroup` NIC property.
pub fn config_params(config: &VmConfig, with_firewall_group: bool) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(name) = config.name() {
        params.push(("name", name.to_string()));
    }
    if let Some(cores) = config.cores {
        params.push(("cores", cores.to_string()));
    }
    if let Some(memory) = config.memory_mb {
        params.push(("memory", memory.to_string()));
    }
    if let Some(pinning) = config.cpu_pinning() {
        params.push(("affinity", pinning.to_string()));
    }
    if let Some(scsihw) = config.scsihw() {
        params.push(("scsihw", scsihw.to_string()));
    }
    if config.touches_network() {
        let group = if with_firewall_group {
            config.firewall_group()
        } else {
            None
        };
        params.push((
            "net0",
            build_net0(config.net_model(), config.bridge(), config.firewall, group),
        ));
    }
    if let Some(cloud_init) = config.cloud_init() {
        params.push(("cicustom", cicustom_value(cloud_init)));
    }
    params
}

/// A template must run the guest agent and carry a cloud-init drive.
pub(crate) fn check_template(vmid: u32, config: &BTreeMap<String, String>) -> BackendResult<()> {
    if !config.get("agent").is_some_and(|value| agent_enabled(value)) {
        return Err(BackendError::Validation(ValidationError::ConstraintViolation(
            format!("template {} does not have the qemu guest agent enabled", vmid),
        )));
    }
    if !has_cloud_init_drive(config) {
        return Err(BackendError::Validation(ValidationError::ConstraintViolation(
            format!("template {} has no cloud-init drive", vmid),
        )));
    }
    Ok(())
}

/// Rejects empty (after trimming) required string arguments.
pub(crate) fn require_text<'a>(field: &str, value: &'a str) -> BackendResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BackendError::field(field, "cannot be empty"));
    }
    Ok(value)
}

/// Disk/volume slot names look like `scsi1`, `virtio2`, `efidisk0`.
pub(crate) fn require_slot(slot: &str) -> BackendResult<&str> {
    let slot = require_text("slot", slot)?;
    let valid = slot.chars().all(|c| c.is_ascii_alphanumeric())
        && slot.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && slot.chars().last().is_some_and(|c| c.is_ascii_digit());
    if !valid {
        return Err(BackendError::field(
            "slot",
            format!("{:?} is not a disk slot name (e.g. scsi1)", slot),
        ));
    }
    Ok(slot)
}

/// Volume ID produced by a storage-side clone: the remote's answer when it
/// is a volume ID, `storage:target` otherwise.
pub(crate) fn cloned_volume_id(storage: &str, target_name: &str, answer: Option<&str>) -> String {
    match answer.map(str::trim) {
        Some(volid) if volid.contains(':') && !volid.starts_with("UPID:") => volid.to_string(),
        _ => format!("{}:{}", storage, target_name),
    }
}
