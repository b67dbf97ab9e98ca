//! Classification of remote error text into the stable error kinds.
//!
//! Both transports surface the hypervisor's human-readable message (API
//! error body or CLI stderr); the indicator lists below are the single place
//! that maps that wording onto [`BackendError`] kinds.

use crate::core::domain::error::BackendError;

const VM_NOT_FOUND_INDICATORS: [&str; 6] = [
    "does not exist",
    "no such vm",
    "no such qemu",
    "no such vmid",
    "vmid does not exist",
    "no vmid found",
];

const VOLUME_NOT_FOUND_INDICATORS: [&str; 4] = [
    "no such volume",
    "volume does not exist",
    "unable to find volume",
    "no such logical volume",
];

const LINKED_CLONE_INDICATORS: [&str; 2] = ["linked clone", "does not support snapshots"];

const FWGROUP_SCHEMA_INDICATORS: [&str; 3] = [
    "fwgroup",
    "property is not defined in schema",
    "additional properties",
];

const GUEST_AGENT_NOT_RUNNING: &str = "guest agent is not running";

pub fn is_vm_not_found_text(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    VM_NOT_FOUND_INDICATORS.iter().any(|needle| lower.contains(needle))
        || (lower.contains("not found") && lower.contains("vm"))
}

pub fn is_volume_not_found_text(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    VOLUME_NOT_FOUND_INDICATORS
        .iter()
        .any(|needle| lower.contains(needle))
        || (lower.contains("volume")
            && (lower.contains("does not exist") || lower.contains("not found")))
}

/// The storage backing the template cannot provide a linked clone.
pub fn is_linked_clone_unsupported_text(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    LINKED_CLONE_INDICATORS.iter().any(|needle| lower.contains(needle))
        || (lower.contains("snapshot") && lower.contains("clone"))
}

/// The hypervisor rejected the `fwgroup` NIC property (older releases).
pub fn is_fwgroup_schema_error_text(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    FWGROUP_SCHEMA_INDICATORS.iter().any(|needle| lower.contains(needle))
}

pub fn is_guest_agent_not_running_text(text: &str) -> bool {
    text.to_ascii_lowercase().contains(GUEST_AGENT_NOT_RUNNING)
}

fn remote_text(err: &BackendError) -> Option<String> {
    match err {
        BackendError::Api { .. } | BackendError::Command(_) => {
            err.remote_message().map(str::to_string)
        }
        BackendError::TaskFailed { exit_status, .. } => Some(exit_status.clone()),
        _ => None,
    }
}

pub fn is_linked_clone_unsupported(err: &BackendError) -> bool {
    remote_text(err).is_some_and(|text| is_linked_clone_unsupported_text(&text))
}

pub fn is_fwgroup_schema_error(err: &BackendError) -> bool {
    remote_text(err).is_some_and(|text| is_fwgroup_schema_error_text(&text))
}

pub fn is_guest_agent_not_running(err: &BackendError) -> bool {
    remote_text(err).is_some_and(|text| is_guest_agent_not_running_text(&text))
}

/// Maps a remote "VM missing" failure onto [`BackendError::VmNotFound`].
pub fn classify_vm_error(err: BackendError, vmid: u32) -> BackendError {
    match remote_text(&err) {
        Some(text) if is_vm_not_found_text(&text) => {
            BackendError::VmNotFound(format!("vm {}: {}", vmid, text.trim()))
        }
        _ => err,
    }
}

/// Maps a remote "volume missing" failure onto [`BackendError::VolumeNotFound`].
pub fn classify_volume_error(err: BackendError, volume_id: &str) -> BackendError {
    match remote_text(&err) {
        Some(text) if is_volume_not_found_text(&text) => {
            BackendError::VolumeNotFound(format!("{}: {}", volume_id, text.trim()))
        }
        _ => err,
    }
}
