//! The contract every hypervisor transport satisfies.

use crate::core::domain::context::OpContext;
use crate::core::domain::error::{BackendError, BackendResult};
use crate::core::domain::model::snapshot::Snapshot;
use crate::core::domain::model::vm::{VmConfig, VmId, VmStats, VmStatus};
use crate::core::domain::model::volume::VolumeInfo;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Provisioning, lifecycle and volume operations against one Proxmox cluster.
///
/// Implemented by [`ApiBackend`](crate::ApiBackend) (HTTP),
/// [`ShellBackend`](crate::ShellBackend) (CLI tools on the node) and
/// [`FakeBackend`](crate::FakeBackend) (in-memory). All three share error
/// kinds, fallback retries and task semantics: a method that submits an
/// asynchronous task returns only after the task has stopped successfully.
///
/// Callers must serialize operations on the same VMID.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Clones `template` into a new VM `target`, optionally naming it.
    ///
    /// A linked clone that the template's storage cannot provide is retried
    /// once as a full clone.
    async fn clone_vm(
        &self,
        ctx: &OpContext,
        template: VmId,
        target: VmId,
        name: &str,
    ) -> BackendResult<()>;

    /// Applies the set fields of `config`, then grows the root disk if
    /// `root_disk_gb` asks for more space than it has.
    async fn configure(&self, ctx: &OpContext, vmid: VmId, config: &VmConfig)
    -> BackendResult<()>;

    async fn start(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()>;
    async fn stop(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()>;
    async fn suspend(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()>;
    async fn resume(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()>;

    /// Destroys the VM and purges it from jobs and firewall config.
    async fn destroy(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()>;

    /// Takes a disk-only snapshot (no RAM state).
    async fn snapshot_create(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()>;
    async fn snapshot_rollback(&self, ctx: &OpContext, vmid: VmId, name: &str)
    -> BackendResult<()>;
    async fn snapshot_delete(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()>;
    /// Lists snapshots, excluding the synthetic `current` entry.
    async fn snapshot_list(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<Vec<Snapshot>>;

    async fn status(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<VmStatus>;
    async fn current_stats(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<VmStats>;

    /// Discovers the VM's primary IPv4 address from the guest agent and the
    /// DHCP lease files. Bounded by the context deadline, or by a fixed
    /// attempt count when there is none.
    async fn guest_ip(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<Ipv4Addr>;

    /// The VM's raw configuration with every value stringified.
    async fn vm_config(&self, ctx: &OpContext, vmid: VmId)
    -> BackendResult<BTreeMap<String, String>>;

    /// Checks that a template has the guest agent enabled and a cloud-init drive.
    async fn validate_template(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()>;

    /// Allocates a raw volume not owned by any VM; returns its volume ID.
    async fn create_volume(
        &self,
        ctx: &OpContext,
        storage: &str,
        name: &str,
        size_gb: u32,
    ) -> BackendResult<String>;
    async fn attach_volume(
        &self,
        ctx: &OpContext,
        vmid: VmId,
        volume_id: &str,
        slot: &str,
    ) -> BackendResult<()>;
    async fn detach_volume(&self, ctx: &OpContext, vmid: VmId, slot: &str) -> BackendResult<()>;
    async fn delete_volume(&self, ctx: &OpContext, volume_id: &str) -> BackendResult<()>;
    async fn volume_info(&self, ctx: &OpContext, volume_id: &str) -> BackendResult<VolumeInfo>;

    /// Volume snapshot and clone operations require ZFS-backed storage and
    /// fail with `StorageUnsupported` elsewhere, before any change is made.
    async fn volume_snapshot_create(
        &self,
        ctx: &OpContext,
        volume_id: &str,
        snapshot: &str,
    ) -> BackendResult<()>;
    async fn volume_snapshot_restore(
        &self,
        ctx: &OpContext,
        volume_id: &str,
        snapshot: &str,
    ) -> BackendResult<()>;
    async fn volume_snapshot_delete(
        &self,
        ctx: &OpContext,
        volume_id: &str,
        snapshot: &str,
    ) -> BackendResult<()>;
    /// Clones a volume on the same storage; returns the new volume ID.
    async fn volume_clone(
        &self,
        ctx: &OpContext,
        source_volume_id: &str,
        target_name: &str,
    ) -> BackendResult<String>;
    /// Clones a volume from one of its snapshots; returns the new volume ID.
    async fn volume_clone_from_snapshot(
        &self,
        ctx: &OpContext,
        source_volume_id: &str,
        snapshot: &str,
        target_name: &str,
    ) -> BackendResult<String>;
}

pub(crate) fn require_vmid(field: &str, vmid: VmId) -> BackendResult<()> {
    if vmid == 0 {
        return Err(BackendError::field(
            field,
            "VMID must be a positive integer",
        ));
    }
    Ok(())
}

/// Validates the set fields of a [`VmConfig`] before any remote call.
pub(crate) fn validate_vm_config(config: &VmConfig) -> BackendResult<()> {
    let positive = [
        ("cores", config.cores),
        ("memory_mb", config.memory_mb),
        ("root_disk_gb", config.root_disk_gb),
    ];
    for (field, value) in positive {
        if value == Some(0) {
            return Err(BackendError::field(
                field,
                "must be at least 1 when set",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_vmid() {
        assert!(require_vmid("vmid", 100).is_ok());
        assert!(require_vmid("vmid", 0).is_err());
    }

    #[test]
    fn test_validate_vm_config_rejects_zero() {
        assert!(validate_vm_config(&VmConfig::default()).is_ok());
        let config = VmConfig {
            cores: Some(0),
            ..Default::default()
        };
        assert!(validate_vm_config(&config).is_err());
        let config = VmConfig {
            root_disk_gb: Some(40),
            memory_mb: Some(2048),
            ..Default::default()
        };
        assert!(validate_vm_config(&config).is_ok());
    }
}
