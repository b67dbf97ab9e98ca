//! [`Backend`] over the node's CLI tools (`qm`, `pvesh`, `pvesm`).

use crate::core::domain::backend::{Backend, require_vmid, validate_vm_config};
use crate::core::domain::context::OpContext;
use crate::core::domain::error::{BackendError, BackendResult};
use crate::core::domain::model::backend_config::{
    CloneMode, DEFAULT_COMMAND_TIMEOUT, ShellBackendConfig,
};
use crate::core::domain::model::guest_agent::{AgentNetworkResponse, reported_addresses};
use crate::core::domain::model::node_list_item::{NodeListItem, first_node_name};
use crate::core::domain::model::snapshot::{Snapshot, SnapshotListItem, snapshots_from_list};
use crate::core::domain::model::task::{TaskHandle, TaskStatus};
use crate::core::domain::model::vm::{VmConfig, VmId, VmStats, VmStatus, VmStatusCurrent};
use crate::core::domain::model::volume::{StorageStatus, VolumeInfo, is_zfs_storage_type};
use crate::core::domain::value_object::{SnapshotName, VolumeId, validate_storage_name};
use crate::core::guest_ip::{DiscoveryOptions, GuestIpSources, discover_guest_ip};
use crate::core::infrastructure::command::{BashRunner, CommandRunner, ExecRunner};
use crate::core::infrastructure::task_waiter::{TaskStatusSource, TaskWaiter};
use crate::core::infrastructure::vm_params::{
    check_template, cloned_volume_id, config_params, require_slot, require_text,
};
use crate::core::parser::classify::{
    classify_vm_error, classify_volume_error, is_fwgroup_schema_error, is_linked_clone_unsupported,
};
use crate::core::parser::config::parse_config_lines;
use crate::core::parser::disk::plan_root_disk_resize;
use crate::core::parser::net::vm_macs;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const JSON_OUTPUT: [&str; 2] = ["--output-format", "json"];

/// Proxmox VE backend driving `qm`, `pvesh` and `pvesm` on the node itself.
///
/// Every invocation is argv-based, validated for control bytes and bounded
/// by the configured command timeout.
pub struct ShellBackend {
    runner: Arc<dyn CommandRunner>,
    qm: String,
    pvesh: String,
    pvesm: String,
    command_timeout: Duration,
    node: OnceCell<String>,
    clone_mode: CloneMode,
    discovery: DiscoveryOptions,
    waiter: TaskWaiter,
}

impl std::fmt::Debug for ShellBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellBackend")
            .field("qm", &self.qm)
            .field("pvesh", &self.pvesh)
            .field("pvesm", &self.pvesm)
            .field("command_timeout", &self.command_timeout)
            .field("node", &self.node.get())
            .field("clone_mode", &self.clone_mode)
            .finish_non_exhaustive()
    }
}

impl ShellBackend {
    /// Builds a backend running tools directly, or through bash when
    /// `use_bash` is set.
    pub fn new(config: ShellBackendConfig) -> BackendResult<Self> {
        let runner: Arc<dyn CommandRunner> = if config.use_bash {
            Arc::new(BashRunner)
        } else {
            Arc::new(ExecRunner)
        };
        Self::with_runner(config, runner)
    }

    /// Builds a backend on a caller-supplied runner (remote exec, tests).
    pub fn with_runner(
        config: ShellBackendConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> BackendResult<Self> {
        let qm = require_text("qm_path", &config.qm_path)?.to_string();
        let pvesh = require_text("pvesh_path", &config.pvesh_path)?.to_string();
        let pvesm = require_text("pvesm_path", &config.pvesm_path)?.to_string();
        let command_timeout = if config.command_timeout.is_zero() {
            DEFAULT_COMMAND_TIMEOUT
        } else {
            config.command_timeout
        };
        let node = config.node.trim();
        let node = if node.is_empty() {
            OnceCell::new()
        } else {
            OnceCell::new_with(Some(node.to_string()))
        };

        Ok(Self {
            runner,
            qm,
            pvesh,
            pvesm,
            command_timeout,
            node,
            clone_mode: config.clone_mode,
            discovery: DiscoveryOptions::shell(config.agent_cidr, config.dhcp_lease_paths),
            waiter: TaskWaiter::default(),
        })
    }

    /// Overrides the task polling backoff.
    pub fn task_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.waiter = TaskWaiter::with_backoff(initial, max);
        self
    }

    /// Overrides the guest IP polling backoff.
    pub fn guest_ip_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.discovery.initial_wait = initial;
        self.discovery.max_wait = max.max(initial);
        self
    }

    /// Runs one tool under the command timeout.
    async fn exec(&self, ctx: &OpContext, tool: &str, args: &[&str]) -> BackendResult<String> {
        let ctx = ctx.with_timeout(self.command_timeout);
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(&ctx, tool, &args).await
    }

    async fn qm(&self, ctx: &OpContext, args: &[&str]) -> BackendResult<String> {
        self.exec(ctx, &self.qm, args).await
    }

    async fn pvesm(&self, ctx: &OpContext, args: &[&str]) -> BackendResult<String> {
        self.exec(ctx, &self.pvesm, args).await
    }

    /// `pvesh get <path> --output-format json`, decoded.
    async fn pvesh_get<T>(&self, ctx: &OpContext, path: &str) -> BackendResult<T>
    where
        T: DeserializeOwned,
    {
        let mut args = vec!["get", path];
        args.extend(JSON_OUTPUT);
        let out = self.exec(ctx, &self.pvesh, &args).await?;
        serde_json::from_str(out.trim())
            .map_err(|e| BackendError::Parse(format!("unexpected pvesh output for {}: {}", path, e)))
    }

    /// `pvesh create|delete <path> [--key value...]`, awaiting any task.
    async fn pvesh_write(
        &self,
        ctx: &OpContext,
        node: &str,
        verb: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> BackendResult<String> {
        let options: Vec<String> = params.iter().map(|(key, _)| format!("--{}", key)).collect();
        let mut args = vec![verb, path];
        for ((_, value), option) in params.iter().zip(&options) {
            args.push(option);
            args.push(value);
        }
        let out = self.exec(ctx, &self.pvesh, &args).await?;
        self.wait_output(ctx, node, &out).await?;
        Ok(out)
    }

    /// Waits for a UPID printed by a CLI tool; plain output means the work
    /// already finished.
    async fn wait_output(&self, ctx: &OpContext, node: &str, out: &str) -> BackendResult<()> {
        let handle = TaskHandle::from_text(out);
        self.waiter.wait(ctx, self, node, &handle).await
    }

    /// The node `pvesh` paths target, detected once and cached.
    pub async fn node(&self, ctx: &OpContext) -> BackendResult<&str> {
        let node = self
            .node
            .get_or_try_init(|| async {
                let nodes: Vec<NodeListItem> = self.pvesh_get(ctx, "/nodes").await?;
                let node = first_node_name(&nodes).ok_or_else(|| {
                    BackendError::Parse("pvesh get /nodes returned no usable node name".to_string())
                })?;
                debug!(node = %node, "detected proxmox node");
                Ok::<_, BackendError>(node)
            })
            .await?;
        Ok(node.as_str())
    }

    async fn clone_once(
        &self,
        ctx: &OpContext,
        template: &str,
        target: &str,
        name: Option<&str>,
        mode: CloneMode,
    ) -> BackendResult<()> {
        let mut args = vec!["clone", template, target, "--full", mode.full_flag()];
        if let Some(name) = name {
            args.extend(["--name", name]);
        }
        let out = self.qm(ctx, &args).await?;
        if let TaskHandle::Upid(_) = TaskHandle::from_text(&out) {
            let node = self.node(ctx).await?;
            self.wait_output(ctx, node, &out).await?;
        }
        Ok(())
    }

    async fn qm_set(&self, ctx: &OpContext, vmid: &str, params: &[(&str, String)]) -> BackendResult<()> {
        let options: Vec<String> = params.iter().map(|(key, _)| format!("--{}", key)).collect();
        let mut args = vec!["set", vmid];
        for ((_, value), option) in params.iter().zip(&options) {
            args.push(option);
            args.push(value);
        }
        self.qm(ctx, &args).await.map(|_| ())
    }

    async fn vm_op(&self, ctx: &OpContext, vmid: VmId, op: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let id = vmid.to_string();
        info!(vmid, op, "changing vm power state");
        self.qm(ctx, &[op, &id])
            .await
            .map(|_| ())
            .map_err(|e| classify_vm_error(e, vmid))
    }

    /// Storage type from `pvesm status`, JSON first, table as fallback.
    async fn storage_type(&self, ctx: &OpContext, storage: &str) -> BackendResult<String> {
        let mut args = vec!["status", "--storage", storage];
        args.extend(JSON_OUTPUT);
        match self.pvesm(ctx, &args).await {
            Ok(out) => {
                if let Ok(entries) = serde_json::from_str::<Vec<StorageStatus>>(out.trim()) {
                    let entry = entries
                        .iter()
                        .find(|e| e.storage.as_deref() == Some(storage))
                        .or_else(|| entries.first());
                    if let Some(entry) = entry {
                        return Ok(entry.storage_type.clone());
                    }
                }
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                debug!(storage, error = %err, "pvesm json status unavailable, reading table");
            }
        }
        let out = self.pvesm(ctx, &["status", "--storage", storage]).await?;
        parse_storage_type_table(&out, storage).ok_or_else(|| {
            BackendError::Parse(format!("storage {} not listed by pvesm status", storage))
        })
    }

    async fn ensure_zfs(&self, ctx: &OpContext, storage: &str) -> BackendResult<()> {
        let storage_type = self.storage_type(ctx, storage).await?;
        if !is_zfs_storage_type(&storage_type) {
            return Err(BackendError::StorageUnsupported {
                storage: storage.to_string(),
                storage_type,
            });
        }
        Ok(())
    }

    fn content_path(node: &str, volume: &VolumeId) -> String {
        format!("/nodes/{}/storage/{}/content/{}", node, volume.storage(), volume)
    }

    async fn volume_clone_inner(
        &self,
        ctx: &OpContext,
        source: &str,
        snapshot: Option<&SnapshotName>,
        target_name: &str,
    ) -> BackendResult<String> {
        let volume = VolumeId::parse(source)?;
        let target_name = require_text("target_name", target_name)?;
        self.ensure_zfs(ctx, volume.storage()).await?;
        let node = self.node(ctx).await?;

        let volid = volume.to_string();
        let path = format!("{}/clone", Self::content_path(node, &volume));
        let mut params = vec![("target", target_name)];
        if let Some(snapshot) = snapshot {
            params.push(("snapname", snapshot.as_str()));
        }
        info!(source = %volid, target = target_name, "cloning volume");
        let out = self
            .pvesh_write(ctx, node, "create", &path, &params)
            .await
            .map_err(|e| classify_volume_error(e, &volid))?;
        let answer = out.trim().trim_matches('"');
        Ok(cloned_volume_id(volume.storage(), target_name, Some(answer)))
    }
}

/// Finds the `Type` column for `storage` in `pvesm status` table output.
pub(crate) fn parse_storage_type_table(text: &str, storage: &str) -> Option<String> {
    text.lines()
        .map(str::split_whitespace)
        .filter_map(|mut cols| Some((cols.next()?, cols.next()?)))
        .find(|(name, _)| *name == storage)
        .map(|(_, storage_type)| storage_type.to_string())
}

/// Volume ID from `pvesm alloc` output (`successfully created 'x:y'`).
pub(crate) fn parse_alloc_output(text: &str) -> Option<String> {
    let start = text.find('\'')? + 1;
    let len = text[start..].find('\'')?;
    let volid = text[start..start + len].trim();
    volid.contains(':').then(|| volid.to_string())
}

#[async_trait]
impl TaskStatusSource for ShellBackend {
    async fn task_status(
        &self,
        ctx: &OpContext,
        node: &str,
        upid: &str,
    ) -> BackendResult<TaskStatus> {
        self.pvesh_get(ctx, &format!("/nodes/{}/tasks/{}/status", node, upid))
            .await
    }
}

#[async_trait]
impl GuestIpSources for ShellBackend {
    async fn vm_macs(&self, ctx: &OpContext, vmid: u32) -> BackendResult<Vec<String>> {
        let config = self.vm_config(ctx, vmid).await?;
        Ok(vm_macs(&config))
    }

    async fn agent_addresses(&self, ctx: &OpContext, vmid: u32) -> BackendResult<Vec<String>> {
        let id = vmid.to_string();
        let out = self
            .qm(ctx, &["guest", "cmd", &id, "network-get-interfaces"])
            .await?;
        let response: AgentNetworkResponse = serde_json::from_str(out.trim())
            .map_err(|e| BackendError::Parse(format!("unexpected guest agent output: {}", e)))?;
        let interfaces = response.interfaces();
        Ok(reported_addresses(&interfaces)
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl Backend for ShellBackend {
    async fn clone_vm(
        &self,
        ctx: &OpContext,
        template: VmId,
        target: VmId,
        name: &str,
    ) -> BackendResult<()> {
        require_vmid("template", template)?;
        require_vmid("target", target)?;
        let name = Some(name.trim()).filter(|n| !n.is_empty());
        let (template_id, target_id) = (template.to_string(), target.to_string());

        info!(template, target, mode = ?self.clone_mode, "cloning vm");
        let result = self
            .clone_once(ctx, &template_id, &target_id, name, self.clone_mode)
            .await;
        let result = match result {
            Err(err) if self.clone_mode == CloneMode::Linked && is_linked_clone_unsupported(&err) => {
                warn!(template, target, error = %err, "linked clone unsupported, retrying as full clone");
                self.clone_once(ctx, &template_id, &target_id, name, CloneMode::Full)
                    .await
            }
            other => other,
        };
        result.map_err(|e| classify_vm_error(e, template))
    }

    async fn configure(&self, ctx: &OpContext, vmid: VmId, config: &VmConfig) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        validate_vm_config(config)?;
        let id = vmid.to_string();

        let params = config_params(config, true);
        if !params.is_empty() {
            match self.qm_set(ctx, &id, &params).await {
                Err(err) if config.firewall_group().is_some() && is_fwgroup_schema_error(&err) => {
                    warn!(vmid, error = %err, "fwgroup rejected by hypervisor, retrying without it");
                    let params = config_params(config, false);
                    self.qm_set(ctx, &id, &params)
                        .await
                        .map_err(|e| classify_vm_error(e, vmid))?;
                }
                other => other.map_err(|e| classify_vm_error(e, vmid))?,
            }
        }

        if let Some(target_gb) = config.root_disk_gb {
            let current = self.vm_config(ctx, vmid).await?;
            if let Some(plan) = plan_root_disk_resize(&current, config.root_disk(), target_gb)? {
                info!(vmid, disk = %plan.disk, delta_gb = plan.delta_gb, "growing root disk");
                let size = plan.size_argument();
                self.qm(ctx, &["resize", &id, &plan.disk, &size])
                    .await
                    .map_err(|e| classify_vm_error(e, vmid))?;
            } else {
                debug!(vmid, target_gb, "root disk already large enough");
            }
        }
        Ok(())
    }

    async fn start(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.vm_op(ctx, vmid, "start").await
    }

    async fn stop(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.vm_op(ctx, vmid, "stop").await
    }

    async fn suspend(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.vm_op(ctx, vmid, "suspend").await
    }

    async fn resume(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.vm_op(ctx, vmid, "resume").await
    }

    async fn destroy(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let id = vmid.to_string();
        info!(vmid, "destroying vm");
        self.qm(ctx, &["destroy", &id, "--purge", "1"])
            .await
            .map(|_| ())
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn snapshot_create(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let name = SnapshotName::new(name)?;
        let id = vmid.to_string();
        self.qm(ctx, &["snapshot", &id, name.as_str(), "--vmstate", "0"])
            .await
            .map(|_| ())
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn snapshot_rollback(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let name = SnapshotName::new(name)?;
        let id = vmid.to_string();
        self.qm(ctx, &["rollback", &id, name.as_str()])
            .await
            .map(|_| ())
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn snapshot_delete(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let name = SnapshotName::new(name)?;
        let id = vmid.to_string();
        self.qm(ctx, &["delsnapshot", &id, name.as_str()])
            .await
            .map(|_| ())
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn snapshot_list(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<Vec<Snapshot>> {
        require_vmid("vmid", vmid)?;
        let node = self.node(ctx).await?;
        let items: Vec<SnapshotListItem> = self
            .pvesh_get(ctx, &format!("/nodes/{}/qemu/{}/snapshot", node, vmid))
            .await
            .map_err(|e| classify_vm_error(e, vmid))?;
        Ok(snapshots_from_list(items))
    }

    async fn status(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<VmStatus> {
        require_vmid("vmid", vmid)?;
        let id = vmid.to_string();
        let out = self
            .qm(ctx, &["status", &id])
            .await
            .map_err(|e| classify_vm_error(e, vmid))?;
        let fields = parse_config_lines(&out);
        Ok(fields
            .get("status")
            .map(|s| VmStatus::from_remote(s))
            .unwrap_or(VmStatus::Unknown))
    }

    async fn current_stats(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<VmStats> {
        require_vmid("vmid", vmid)?;
        let node = self.node(ctx).await?;
        let current: VmStatusCurrent = self
            .pvesh_get(ctx, &format!("/nodes/{}/qemu/{}/status/current", node, vmid))
            .await
            .map_err(|e| classify_vm_error(e, vmid))?;
        Ok(VmStats {
            cpu_usage: current.cpu.unwrap_or(0.0),
        })
    }

    async fn guest_ip(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<Ipv4Addr> {
        require_vmid("vmid", vmid)?;
        discover_guest_ip(ctx, vmid, self, &self.discovery).await
    }

    async fn vm_config(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<BTreeMap<String, String>> {
        require_vmid("vmid", vmid)?;
        let id = vmid.to_string();
        let out = self
            .qm(ctx, &["config", &id])
            .await
            .map_err(|e| classify_vm_error(e, vmid))?;
        Ok(parse_config_lines(&out))
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
        let size = format!("{}G", size_gb);
        info!(storage, name, size_gb, "allocating volume");
        let out = self.pvesm(ctx, &["alloc", storage, "0", name, &size]).await?;
        Ok(parse_alloc_output(&out).unwrap_or_else(|| format!("{}:{}", storage, name)))
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
        let slot = require_slot(slot)?;
        let id = vmid.to_string();
        self.qm_set(ctx, &id, &[(slot, volume.to_string())])
            .await
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn detach_volume(&self, ctx: &OpContext, vmid: VmId, slot: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let slot = require_slot(slot)?;
        let id = vmid.to_string();
        self.qm_set(ctx, &id, &[("delete", slot.to_string())])
            .await
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn delete_volume(&self, ctx: &OpContext, volume_id: &str) -> BackendResult<()> {
        let volume = VolumeId::parse(volume_id)?;
        let volid = volume.to_string();
        info!(volume = %volid, "deleting volume");
        self.pvesm(ctx, &["free", &volid])
            .await
            .map(|_| ())
            .map_err(|e| classify_volume_error(e, &volid))
    }

    async fn volume_info(&self, ctx: &OpContext, volume_id: &str) -> BackendResult<VolumeInfo> {
        let volume = VolumeId::parse(volume_id)?;
        let volid = volume.to_string();
        let out = self
            .pvesm(ctx, &["path", &volid])
            .await
            .map_err(|e| classify_volume_error(e, &volid))?;
        let path = out.trim();
        if path.is_empty() {
            return Err(BackendError::Parse(format!("pvesm path printed nothing for {}", volid)));
        }
        Ok(VolumeInfo {
            volume_id: volid.clone(),
            storage: volume.storage().to_string(),
            path: path.to_string(),
        })
    }

    async fn volume_snapshot_create(
        &self,
        ctx: &OpContext,
        volume_id: &str,
        snapshot: &str,
    ) -> BackendResult<()> {
        let volume = VolumeId::parse(volume_id)?;
        let snapshot = SnapshotName::new(snapshot)?;
        self.ensure_zfs(ctx, volume.storage()).await?;
        let node = self.node(ctx).await?;
        let path = format!("{}/snapshot", Self::content_path(node, &volume));
        self.pvesh_write(ctx, node, "create", &path, &[("snapname", snapshot.as_str())])
            .await
            .map(|_| ())
            .map_err(|e| classify_volume_error(e, &volume.to_string()))
    }

    async fn volume_snapshot_restore(
        &self,
        ctx: &OpContext,
        volume_id: &str,
        snapshot: &str,
    ) -> BackendResult<()> {
        let volume = VolumeId::parse(volume_id)?;
        let snapshot = SnapshotName::new(snapshot)?;
        self.ensure_zfs(ctx, volume.storage()).await?;
        let node = self.node(ctx).await?;
        let path = format!(
            "{}/snapshot/{}/rollback",
            Self::content_path(node, &volume),
            snapshot
        );
        self.pvesh_write(ctx, node, "create", &path, &[])
            .await
            .map(|_| ())
            .map_err(|e| classify_volume_error(e, &volume.to_string()))
    }

    async fn volume_snapshot_delete(
        &self,
        ctx: &OpContext,
        volume_id: &str,
        snapshot: &str,
    ) -> BackendResult<()> {
        let volume = VolumeId::parse(volume_id)?;
        let snapshot = SnapshotName::new(snapshot)?;
        self.ensure_zfs(ctx, volume.storage()).await?;
        let node = self.node(ctx).await?;
        let path = format!("{}/snapshot/{}", Self::content_path(node, &volume), snapshot);
        self.pvesh_write(ctx, node, "delete", &path, &[])
            .await
            .map(|_| ())
            .map_err(|e| classify_volume_error(e, &volume.to_string()))
    }

    async fn volume_clone(
        &self,
        ctx: &OpContext,
        source_volume_id: &str,
        target_name: &str,
    ) -> BackendResult<String> {
        self.volume_clone_inner(ctx, source_volume_id, None, target_name)
            .await
    }

    async fn volume_clone_from_snapshot(
        &self,
        ctx: &OpContext,
        source_volume_id: &str,
        snapshot: &str,
        target_name: &str,
    ) -> BackendResult<String> {
        let snapshot = SnapshotName::new(snapshot)?;
        self.volume_clone_inner(ctx, source_volume_id, Some(&snapshot), target_name)
            .await
    }
}
