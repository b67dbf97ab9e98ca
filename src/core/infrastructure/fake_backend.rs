//! In-memory [`Backend`] for callers' test suites.
//!
//! All state sits behind one mutex so every operation is atomic with
//! respect to the others. Behaviour mirrors the real transports: the same
//! validation, the same error kinds, and the ZFS gate on volume snapshots.

use crate::core::domain::backend::{Backend, require_vmid, validate_vm_config};
use crate::core::domain::context::OpContext;
use crate::core::domain::error::{BackendError, BackendResult};
use crate::core::domain::model::snapshot::Snapshot;
use crate::core::domain::model::vm::{VmConfig, VmId, VmStats, VmStatus};
use crate::core::domain::model::volume::{VolumeInfo, is_zfs_storage_type};
use crate::core::domain::value_object::{SnapshotName, VolumeId, validate_storage_name};
use crate::core::infrastructure::vm_params::{check_template, config_params, require_slot, require_text};
use crate::core::parser::disk::plan_root_disk_resize;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::net::Ipv4Addr;
use tokio::sync::Mutex;

/// Storage type assumed for storages without an override.
pub const FAKE_DEFAULT_STORAGE_TYPE: &str = "zfspool";
const FAKE_RUNNING_CPU: f64 = 0.05;

#[derive(Debug, Clone)]
struct FakeVm {
    status: VmStatus,
    paused: bool,
    config: BTreeMap<String, String>,
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Clone)]
struct FakeVolume {
    size_gb: u32,
    attached_to: Option<(VmId, String)>,
    snapshots: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    vms: BTreeMap<VmId, FakeVm>,
    volumes: BTreeMap<String, FakeVolume>,
    storage_types: HashMap<String, String>,
    guest_ips: HashMap<VmId, Ipv4Addr>,
    failures: VecDeque<BackendError>,
}

impl FakeState {
    fn vm(&self, vmid: VmId) -> BackendResult<&FakeVm> {
        self.vms
            .get(&vmid)
            .ok_or_else(|| BackendError::VmNotFound(format!("vm {}", vmid)))
    }

    fn vm_mut(&mut self, vmid: VmId) -> BackendResult<&mut FakeVm> {
        self.vms
            .get_mut(&vmid)
            .ok_or_else(|| BackendError::VmNotFound(format!("vm {}", vmid)))
    }

    fn volume_mut(&mut self, volume: &VolumeId) -> BackendResult<&mut FakeVolume> {
        self.volumes
            .get_mut(&volume.to_string())
            .ok_or_else(|| BackendError::VolumeNotFound(volume.to_string()))
    }

    fn storage_type(&self, storage: &str) -> &str {
        self.storage_types
            .get(storage)
            .map(String::as_str)
            .unwrap_or(FAKE_DEFAULT_STORAGE_TYPE)
    }

    fn ensure_zfs(&self, storage: &str) -> BackendResult<()> {
        let storage_type = self.storage_type(storage);
        if !is_zfs_storage_type(storage_type) {
            return Err(BackendError::StorageUnsupported {
                storage: storage.to_string(),
                storage_type: storage_type.to_string(),
            });
        }
        Ok(())
    }

    fn take_failure(&mut self) -> BackendResult<()> {
        match self.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn insert_volume(&mut self, volid: String, size_gb: u32) -> BackendResult<String> {
        if self.volumes.contains_key(&volid) {
            return Err(remote_error(format!("volume '{}' already exists", volid)));
        }
        self.volumes.insert(
            volid.clone(),
            FakeVolume {
                size_gb,
                attached_to: None,
                snapshots: BTreeSet::new(),
            },
        );
        Ok(volid)
    }
}

fn remote_error(message: String) -> BackendError {
    BackendError::Api {
        status: 500,
        message,
    }
}

/// Synthetic guest address of a running VM: `10.77.{vmid / 256}.{vmid % 256}`.
pub fn fake_guest_ip(vmid: VmId) -> Ipv4Addr {
    Ipv4Addr::new(10, 77, ((vmid >> 8) & 0xff) as u8, (vmid & 0xff) as u8)
}

fn template_config(vmid: VmId) -> BTreeMap<String, String> {
    [
        ("name", format!("template-{}", vmid)),
        ("agent", "1".to_string()),
        ("cores", "1".to_string()),
        ("memory", "2048".to_string()),
        ("scsihw", "virtio-scsi-pci".to_string()),
        ("scsi0", format!("local-zfs:base-{}-disk-0,size=8G", vmid)),
        ("ide2", format!("local-zfs:vm-{}-cloudinit,media=cdrom", vmid)),
        ("boot", "order=scsi0".to_string()),
        ("net0", "virtio,bridge=vmbr0".to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

fn with_size(spec: &str, size_gb: u32) -> String {
    spec.split(',')
        .map(|part| {
            if part.trim().starts_with("size=") {
                format!("size={}G", size_gb)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// An in-memory hypervisor.
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stopped template VM with the guest agent and a cloud-init
    /// drive, so it passes `validate_template` and can be cloned.
    pub async fn add_template(&self, vmid: VmId) {
        let mut state = self.state.lock().await;
        state.vms.insert(
            vmid,
            FakeVm {
                status: VmStatus::Stopped,
                paused: false,
                config: template_config(vmid),
                snapshots: Vec::new(),
            },
        );
    }

    /// Overrides the address `guest_ip` reports for `vmid`.
    pub async fn set_guest_ip(&self, vmid: VmId, ip: Ipv4Addr) {
        self.state.lock().await.guest_ips.insert(vmid, ip);
    }

    /// Overrides the type of `storage` (default `zfspool`).
    pub async fn set_storage_type(&self, storage: &str, storage_type: &str) {
        self.state
            .lock()
            .await
            .storage_types
            .insert(storage.to_string(), storage_type.to_string());
    }

    /// Makes the next operation fail with `err`. Queued failures are
    /// returned one per call, in order.
    pub async fn fail_next(&self, err: BackendError) {
        self.state.lock().await.failures.push_back(err);
    }

    /// Whether the VM exists.
    pub async fn has_vm(&self, vmid: VmId) -> bool {
        self.state.lock().await.vms.contains_key(&vmid)
    }

    /// Whether the volume exists.
    pub async fn has_volume(&self, volume_id: &str) -> bool {
        self.state.lock().await.volumes.contains_key(volume_id)
    }

    /// Runs `op` on the locked state after the cancellation and injected
    /// failure checks.
    async fn with_state<T>(
        &self,
        ctx: &OpContext,
        op: impl FnOnce(&mut FakeState) -> BackendResult<T>,
    ) -> BackendResult<T> {
        ctx.check()?;
        let mut state = ctx.run(async { Ok(self.state.lock().await) }).await?;
        state.take_failure()?;
        op(&mut state)
    }

    async fn set_power(
        &self,
        ctx: &OpContext,
        vmid: VmId,
        status: VmStatus,
        paused: bool,
    ) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        self.with_state(ctx, |state| {
            let vm = state.vm_mut(vmid)?;
            vm.status = status;
            vm.paused = paused;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn clone_vm(
        &self,
        ctx: &OpContext,
        template: VmId,
        target: VmId,
        name: &str,
    ) -> BackendResult<()> {
        require_vmid("template", template)?;
        require_vmid("target", target)?;
        let name = name.trim().to_string();
        self.with_state(ctx, |state| {
            let mut config = state.vm(template)?.config.clone();
            if state.vms.contains_key(&target) {
                return Err(remote_error(format!("VM {} already exists", target)));
            }
            if !name.is_empty() {
                config.insert("name".to_string(), name);
            }
            if let Some(disk) = config.get_mut("scsi0") {
                *disk = disk.replace(
                    &format!("base-{}-disk-0", template),
                    &format!("vm-{}-disk-0", target),
                );
            }
            state.vms.insert(
                target,
                FakeVm {
                    status: VmStatus::Stopped,
                    paused: false,
                    config,
                    snapshots: Vec::new(),
                },
            );
            Ok(())
        })
        .await
    }

    async fn configure(&self, ctx: &OpContext, vmid: VmId, config: &VmConfig) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        validate_vm_config(config)?;
        self.with_state(ctx, |state| {
            let vm = state.vm_mut(vmid)?;
            if let Some(target_gb) = config.root_disk_gb {
                if let Some(plan) = plan_root_disk_resize(&vm.config, config.root_disk(), target_gb)? {
                    if let Some(spec) = vm.config.get_mut(&plan.disk) {
                        *spec = with_size(spec, target_gb);
                    }
                }
            }
            for (key, value) in config_params(config, true) {
                vm.config.insert(key.to_string(), value);
            }
            Ok(())
        })
        .await
    }

    async fn start(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.set_power(ctx, vmid, VmStatus::Running, false).await
    }

    async fn stop(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.set_power(ctx, vmid, VmStatus::Stopped, false).await
    }

    async fn suspend(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.set_power(ctx, vmid, VmStatus::Running, true).await
    }

    async fn resume(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.set_power(ctx, vmid, VmStatus::Running, false).await
    }

    async fn destroy(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        self.with_state(ctx, |state| {
            state
                .vms
                .remove(&vmid)
                .ok_or_else(|| BackendError::VmNotFound(format!("vm {}", vmid)))?;
            state.guest_ips.remove(&vmid);
            for volume in state.volumes.values_mut() {
                if volume.attached_to.as_ref().is_some_and(|(owner, _)| *owner == vmid) {
                    volume.attached_to = None;
                }
            }
            Ok(())
        })
        .await
    }

    async fn snapshot_create(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let name = SnapshotName::new(name)?;
        self.with_state(ctx, |state| {
            let vm = state.vm_mut(vmid)?;
            if vm.snapshots.iter().any(|s| s.name == name.as_str()) {
                return Err(remote_error(format!("snapshot name '{}' already used", name)));
            }
            vm.snapshots.push(Snapshot {
                name: name.as_str().to_string(),
                description: String::new(),
                created_at: Utc::now(),
            });
            Ok(())
        })
        .await
    }

    async fn snapshot_rollback(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let name = SnapshotName::new(name)?;
        self.with_state(ctx, |state| {
            let vm = state.vm_mut(vmid)?;
            if !vm.snapshots.iter().any(|s| s.name == name.as_str()) {
                return Err(remote_error(format!("snapshot '{}' does not exist", name)));
            }
            vm.status = VmStatus::Stopped;
            vm.paused = false;
            Ok(())
        })
        .await
    }

    async fn snapshot_delete(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let name = SnapshotName::new(name)?;
        self.with_state(ctx, |state| {
            let vm = state.vm_mut(vmid)?;
            let before = vm.snapshots.len();
            vm.snapshots.retain(|s| s.name != name.as_str());
            if vm.snapshots.len() == before {
                return Err(remote_error(format!("snapshot '{}' does not exist", name)));
            }
            Ok(())
        })
        .await
    }

    async fn snapshot_list(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<Vec<Snapshot>> {
        require_vmid("vmid", vmid)?;
        self.with_state(ctx, |state| Ok(state.vm(vmid)?.snapshots.clone()))
            .await
    }

    async fn status(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<VmStatus> {
        require_vmid("vmid", vmid)?;
        self.with_state(ctx, |state| Ok(state.vm(vmid)?.status))
            .await
    }

    async fn current_stats(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<VmStats> {
        require_vmid("vmid", vmid)?;
        self.with_state(ctx, |state| {
            let vm = state.vm(vmid)?;
            let busy = vm.status == VmStatus::Running && !vm.paused;
            Ok(VmStats {
                cpu_usage: if busy { FAKE_RUNNING_CPU } else { 0.0 },
            })
        })
        .await
    }

    async fn guest_ip(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<Ipv4Addr> {
        require_vmid("vmid", vmid)?;
        self.with_state(ctx, |state| {
            if state.vm(vmid)?.status != VmStatus::Running {
                return Err(BackendError::GuestIpNotFound {
                    vmid,
                    agent: "guest agent is not running".to_string(),
                    lease: "no dhcp lease".to_string(),
                });
            }
            Ok(state
                .guest_ips
                .get(&vmid)
                .copied()
                .unwrap_or_else(|| fake_guest_ip(vmid)))
        })
        .await
    }

    async fn vm_config(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<BTreeMap<String, String>> {
        require_vmid("vmid", vmid)?;
        self.with_state(ctx, |state| Ok(state.vm(vmid)?.config.clone()))
            .await
    }

    async fn validate_template(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        let config = self.vm_config(ctx, vmid).await?;
        check_template(vmid, &config)
    }

    async fn create_volume(
        &self,
        ctx: &OpContext,
        storage: &str,
        name: &str,
        size_gb: u32,
    ) -> BackendResult<String> {
        let storage = storage.trim();
        validate_storage_name(storage)?;
        let name = require_text("name", name)?;
        if size_gb == 0 {
            return Err(BackendError::field("size_gb", "must be at least 1"));
        }
        let volid = format!("{}:{}", storage, name);
        self.with_state(ctx, |state| state.insert_volume(volid, size_gb))
            .await
    }

    async fn attach_volume(
        &self,
        ctx: &OpContext,
        vmid: VmId,
        volume_id: &str,
        slot: &str,
    ) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let volume = VolumeId::parse(volume_id)?;
        let slot = require_slot(slot)?.to_string();
        self.with_state(ctx, |state| {
            state.vm(vmid)?;
            let entry = state.volume_mut(&volume)?;
            if let Some((owner, owner_slot)) = &entry.attached_to {
                return Err(remote_error(format!(
                    "volume {} already attached to vm {} as {}",
                    volume, owner, owner_slot
                )));
            }
            let spec = format!("{},size={}G", volume, entry.size_gb);
            entry.attached_to = Some((vmid, slot.clone()));
            state.vm_mut(vmid)?.config.insert(slot, spec);
            Ok(())
        })
        .await
    }

    async fn detach_volume(&self, ctx: &OpContext, vmid: VmId, slot: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let slot = require_slot(slot)?.to_string();
        self.with_state(ctx, |state| {
            state.vm_mut(vmid)?.config.remove(&slot);
            for volume in state.volumes.values_mut() {
                if volume
                    .attached_to
                    .as_ref()
                    .is_some_and(|(owner, owner_slot)| *owner == vmid && *owner_slot == slot)
                {
                    volume.attached_to = None;
                }
            }
            Ok(())
        })
        .await
    }

    async fn delete_volume(&self, ctx: &OpContext, volume_id: &str) -> BackendResult<()> {
        let volume = VolumeId::parse(volume_id)?;
        self.with_state(ctx, |state| {
            if let Some((owner, _)) = &state.volume_mut(&volume)?.attached_to {
                return Err(remote_error(format!("volume {} is in use by vm {}", volume, owner)));
            }
            state.volumes.remove(&volume.to_string());
            Ok(())
        })
        .await
    }

    async fn volume_info(&self, ctx: &OpContext, volume_id: &str) -> BackendResult<VolumeInfo> {
        let volume = VolumeId::parse(volume_id)?;
        self.with_state(ctx, |state| {
            state.volume_mut(&volume)?;
            let path = if is_zfs_storage_type(state.storage_type(volume.storage())) {
                format!("/dev/zvol/{}/{}", volume.storage(), volume.name())
            } else {
                format!("/var/lib/fake/{}/{}", volume.storage(), volume.name())
            };
            Ok(VolumeInfo {
                volume_id: volume.to_string(),
                storage: volume.storage().to_string(),
                path,
            })
        })
        .await
    }

    async fn volume_snapshot_create(
        &self,
        ctx: &OpContext,
        volume_id: &str,
        snapshot: &str,
    ) -> BackendResult<()> {
        let volume = VolumeId::parse(volume_id)?;
        let snapshot = SnapshotName::new(snapshot)?;
        self.with_state(ctx, |state| {
            state.ensure_zfs(volume.storage())?;
            let entry = state.volume_mut(&volume)?;
            if !entry.snapshots.insert(snapshot.as_str().to_string()) {
                return Err(remote_error(format!("snapshot '{}' already exists", snapshot)));
            }
            Ok(())
        })
        .await
    }

    async fn volume_snapshot_restore(
        &self,
        ctx: &OpContext,
        volume_id: &str,
        snapshot: &str,
    ) -> BackendResult<()> {
        let volume = VolumeId::parse(volume_id)?;
        let snapshot = SnapshotName::new(snapshot)?;
        self.with_state(ctx, |state| {
            state.ensure_zfs(volume.storage())?;
            if !state.volume_mut(&volume)?.snapshots.contains(snapshot.as_str()) {
                return Err(remote_error(format!("snapshot '{}' does not exist", snapshot)));
            }
            Ok(())
        })
        .await
    }

    async fn volume_snapshot_delete(
        &self,
        ctx: &OpContext,
        volume_id: &str,
        snapshot: &str,
    ) -> BackendResult<()> {
        let volume = VolumeId::parse(volume_id)?;
        let snapshot = SnapshotName::new(snapshot)?;
        self.with_state(ctx, |state| {
            state.ensure_zfs(volume.storage())?;
            if !state.volume_mut(&volume)?.snapshots.remove(snapshot.as_str()) {
                return Err(remote_error(format!("snapshot '{}' does not exist", snapshot)));
            }
            Ok(())
        })
        .await
    }

    async fn volume_clone(
        &self,
        ctx: &OpContext,
        source_volume_id: &str,
        target_name: &str,
    ) -> BackendResult<String> {
        let volume = VolumeId::parse(source_volume_id)?;
        let target_name = require_text("target_name", target_name)?;
        self.with_state(ctx, |state| {
            state.ensure_zfs(volume.storage())?;
            let size_gb = state.volume_mut(&volume)?.size_gb;
            state.insert_volume(format!("{}:{}", volume.storage(), target_name), size_gb)
        })
        .await
    }

    async fn volume_clone_from_snapshot(
        &self,
        ctx: &OpContext,
        source_volume_id: &str,
        snapshot: &str,
        target_name: &str,
    ) -> BackendResult<String> {
        let volume = VolumeId::parse(source_volume_id)?;
        let snapshot = SnapshotName::new(snapshot)?;
        let target_name = require_text("target_name", target_name)?;
        self.with_state(ctx, |state| {
            state.ensure_zfs(volume.storage())?;
            let entry = state.volume_mut(&volume)?;
            if !entry.snapshots.contains(snapshot.as_str()) {
                return Err(remote_error(format!("snapshot '{}' does not exist", snapshot)));
            }
            let size_gb = entry.size_gb;
            state.insert_volume(format!("{}:{}", volume.storage(), target_name), size_gb)
        })
        .await
    }
}
