//! [`Backend`] over the Proxmox VE HTTP API.

use crate::core::domain::backend::{Backend, require_vmid, validate_vm_config};
use crate::core::domain::context::OpContext;
use crate::core::domain::error::{BackendError, BackendResult, ValidationError};
use crate::core::domain::model::backend_config::{
    ApiBackendConfig, CloneMode, DEFAULT_REQUEST_TIMEOUT, RateLimitConfig,
};
use crate::core::domain::model::guest_agent::{AgentNetworkResponse, reported_addresses};
use crate::core::domain::model::node_list_item::{NodeListItem, first_node_name};
use crate::core::domain::model::snapshot::{Snapshot, SnapshotListItem, snapshots_from_list};
use crate::core::domain::model::task::TaskHandle;
use crate::core::domain::model::vm::{VmConfig, VmId, VmStats, VmStatus, VmStatusCurrent};
use crate::core::domain::model::volume::{StorageStatus, VolumeContent, VolumeInfo, is_zfs_storage_type};
use crate::core::domain::value_object::{
    ApiToken, ApiUrl, SnapshotName, VolumeId, validate_storage_name,
};
use crate::core::guest_ip::{DiscoveryOptions, GuestIpSources, discover_guest_ip};
use crate::core::infrastructure::api_client::{ApiClient, TlsPolicy};
use crate::core::infrastructure::shell_backend::ShellBackend;
use crate::core::infrastructure::task_waiter::TaskWaiter;
use crate::core::infrastructure::vm_params::{
    check_template, cloned_volume_id, config_params, require_slot, require_text,
};
use crate::core::parser::classify::{
    classify_vm_error, classify_volume_error, is_fwgroup_schema_error, is_linked_clone_unsupported,
};
use crate::core::parser::config::normalize_config_map;
use crate::core::parser::disk::plan_root_disk_resize;
use crate::core::parser::net::vm_macs;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Proxmox VE backend speaking the REST API with an API token.
///
/// # Examples
///
/// ```no_run
/// use agentlab_proxmox::{ApiBackend, Backend, BackendResult, CloneMode, OpContext};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> BackendResult<()> {
///     let backend = ApiBackend::builder()
///         .base_url("https://pve.example.com:8006/api2/json")
///         .token("root@pam!agentlab=00000000-0000-0000-0000-000000000000")
///         .clone_mode(CloneMode::Linked)
///         .agent_cidr("10.77.0.0/16")?
///         .build()
///         .await?;
///
///     let ctx = OpContext::new().with_timeout(Duration::from_secs(120));
///     backend.clone_vm(&ctx, 9000, 101, "sandbox-101").await?;
///     backend.start(&ctx, 101).await?;
///     let ip = backend.guest_ip(&ctx, 101).await?;
///     println!("sandbox reachable at {}", ip);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct ApiBackend {
    client: Arc<ApiClient>,
    node: OnceCell<String>,
    clone_mode: CloneMode,
    discovery: DiscoveryOptions,
    waiter: TaskWaiter,
    cli_fallback: Option<Arc<ShellBackend>>,
}

/// Builder for [`ApiBackend`].
#[derive(Debug, Default)]
pub struct ApiBackendBuilder {
    config: ApiBackendConfig,
    cli_fallback: Option<Arc<ShellBackend>>,
    waiter: Option<TaskWaiter>,
    discovery_backoff: Option<(Duration, Duration)>,
}

impl ApiBackendBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = token.into();
        self
    }

    /// Pins the node; otherwise the first entry of `/nodes` is used.
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.config.node = node.into();
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.config.verify_tls = verify;
        self
    }

    pub fn ca_bundle_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ca_bundle_path = Some(path.into());
        self
    }

    pub fn clone_mode(mut self, mode: CloneMode) -> Self {
        self.config.clone_mode = mode;
        self
    }

    /// Preferred network for guest IP selection.
    pub fn agent_cidr(mut self, cidr: &str) -> BackendResult<Self> {
        let net: Ipv4Net = cidr.trim().parse().map_err(|e| ValidationError::Field {
            field: "agent_cidr".to_string(),
            message: format!("invalid IPv4 CIDR {:?}: {}", cidr, e),
        })?;
        self.config.agent_cidr = Some(net);
        Ok(self)
    }

    pub fn dhcp_lease_paths(mut self, paths: Vec<String>) -> Self {
        self.config.dhcp_lease_paths = paths;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = Some(rate_limit);
        self
    }

    /// Routes volume snapshot and clone operations through the node CLI.
    pub fn cli_fallback(mut self, shell: ShellBackend) -> Self {
        self.cli_fallback = Some(Arc::new(shell));
        self
    }

    /// Overrides the task polling backoff.
    pub fn task_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.waiter = Some(TaskWaiter::with_backoff(initial, max));
        self
    }

    /// Overrides the guest IP polling backoff.
    pub fn guest_ip_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.discovery_backoff = Some((initial, max));
        self
    }

    /// Starts from a deserialized configuration.
    pub fn from_config(config: ApiBackendConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Validates the settings and builds the backend. No request is made;
    /// the node is detected on first use when not configured.
    pub async fn build(self) -> BackendResult<ApiBackend> {
        let config = self.config;
        let base_url = ApiUrl::new(&config.base_url)?;
        let token = ApiToken::new(config.token.as_str())?;

        let ca_bundle = match (&config.ca_bundle_path, config.verify_tls) {
            (Some(_), false) => {
                return Err(ValidationError::ConstraintViolation(
                    "a CA bundle cannot be combined with disabled TLS verification".to_string(),
                )
                .into());
            }
            (Some(path), true) => Some(tokio::fs::read(path).await.map_err(|e| {
                BackendError::io(format!("read CA bundle {}", path.display()), e)
            })?),
            (None, _) => None,
        };
        let tls = TlsPolicy::resolve(config.verify_tls, ca_bundle)?;

        let request_timeout = if config.request_timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            config.request_timeout
        };
        let client = ApiClient::new(base_url, token, tls, request_timeout, config.rate_limit)?;
        debug!(base_url = %client.base_url(), ?request_timeout, "api client ready");

        let node = config.node.trim();
        let node = if node.is_empty() {
            OnceCell::new()
        } else {
            OnceCell::new_with(Some(node.to_string()))
        };

        let mut discovery = DiscoveryOptions::api(config.agent_cidr, config.dhcp_lease_paths);
        if let Some((initial, max)) = self.discovery_backoff {
            discovery.initial_wait = initial;
            discovery.max_wait = max.max(initial);
        }

        Ok(ApiBackend {
            client: Arc::new(client),
            node,
            clone_mode: config.clone_mode,
            discovery,
            waiter: self.waiter.unwrap_or_default(),
            cli_fallback: self.cli_fallback,
        })
    }
}

impl ApiBackend {
    pub fn builder() -> ApiBackendBuilder {
        ApiBackendBuilder::default()
    }

    /// The node all requests target, detected once and cached.
    pub async fn node(&self, ctx: &OpContext) -> BackendResult<&str> {
        let node = self
            .node
            .get_or_try_init(|| async {
                let nodes: Vec<NodeListItem> = self.client.get_as(ctx, &["nodes"]).await?;
                let node = first_node_name(&nodes).ok_or_else(|| {
                    BackendError::Parse("GET /nodes returned no usable node name".to_string())
                })?;
                debug!(node = %node, "detected proxmox node");
                Ok::<_, BackendError>(node)
            })
            .await?;
        Ok(node.as_str())
    }

    async fn wait_task(&self, ctx: &OpContext, node: &str, data: &Value) -> BackendResult<()> {
        let handle = TaskHandle::from_response(data);
        self.waiter.wait(ctx, self.client.as_ref(), node, &handle).await
    }

    /// Submits a write and waits for its task, if any.
    async fn post_and_wait(
        &self,
        ctx: &OpContext,
        node: &str,
        segments: &[&str],
        form: &[(&str, String)],
    ) -> BackendResult<Value> {
        let data = self.client.post(ctx, segments, form).await?;
        self.wait_task(ctx, node, &data).await?;
        Ok(data)
    }

    async fn delete_and_wait(
        &self,
        ctx: &OpContext,
        node: &str,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> BackendResult<()> {
        let data = self.client.delete(ctx, segments, query).await?;
        self.wait_task(ctx, node, &data).await
    }

    async fn put_config(
        &self,
        ctx: &OpContext,
        node: &str,
        vmid: VmId,
        params: &[(&str, String)],
    ) -> BackendResult<()> {
        let vmid = vmid.to_string();
        let data = self
            .client
            .put(ctx, &["nodes", node, "qemu", &vmid, "config"], params)
            .await?;
        self.wait_task(ctx, node, &data).await
    }

    async fn clone_once(
        &self,
        ctx: &OpContext,
        node: &str,
        template: VmId,
        target: VmId,
        name: Option<&str>,
        mode: CloneMode,
    ) -> BackendResult<()> {
        let template = template.to_string();
        let mut form = vec![("newid", target.to_string()), ("full", mode.full_flag().to_string())];
        if let Some(name) = name {
            form.push(("name", name.to_string()));
        }
        self.post_and_wait(ctx, node, &["nodes", node, "qemu", &template, "clone"], &form)
            .await
            .map(|_| ())
    }

    async fn vm_status_current(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<VmStatusCurrent> {
        require_vmid("vmid", vmid)?;
        let node = self.node(ctx).await?;
        let id = vmid.to_string();
        self.client
            .get_as(ctx, &["nodes", node, "qemu", &id, "status", "current"])
            .await
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn vm_status_op(&self, ctx: &OpContext, vmid: VmId, op: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let node = self.node(ctx).await?;
        let id = vmid.to_string();
        info!(vmid, node, op, "changing vm power state");
        self.post_and_wait(ctx, node, &["nodes", node, "qemu", &id, "status", op], &[])
            .await
            .map(|_| ())
            .map_err(|e| classify_vm_error(e, vmid))
    }

    /// Fails with `StorageUnsupported` unless `storage` is ZFS-backed.
    async fn ensure_zfs(&self, ctx: &OpContext, node: &str, storage: &str) -> BackendResult<()> {
        let status: StorageStatus = self
            .client
            .get_as(ctx, &["nodes", node, "storage", storage, "status"])
            .await?;
        if !is_zfs_storage_type(&status.storage_type) {
            return Err(BackendError::StorageUnsupported {
                storage: storage.to_string(),
                storage_type: status.storage_type,
            });
        }
        Ok(())
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
        let node = self.node(ctx).await?;
        self.ensure_zfs(ctx, node, volume.storage()).await?;

        let volid = volume.to_string();
        let mut form = vec![("target", target_name.to_string())];
        if let Some(snapshot) = snapshot {
            form.push(("snapname", snapshot.to_string()));
        }
        info!(source = %volid, target = target_name, "cloning volume");
        let data = self
            .post_and_wait(
                ctx,
                node,
                &["nodes", node, "storage", volume.storage(), "content", &volid, "clone"],
                &form,
            )
            .await
            .map_err(|e| classify_volume_error(e, &volid))?;
        Ok(cloned_volume_id(volume.storage(), target_name, data.as_str()))
    }

    /// Shared body of the three volume snapshot operations.
    async fn volume_snapshot_op(
        &self,
        ctx: &OpContext,
        volume: &VolumeId,
        snapshot: &SnapshotName,
        op: VolumeSnapshotOp,
    ) -> BackendResult<()> {
        let node = self.node(ctx).await?;
        self.ensure_zfs(ctx, node, volume.storage()).await?;

        let volid = volume.to_string();
        let storage = volume.storage();
        let name = snapshot.as_str();
        let result = match op {
            VolumeSnapshotOp::Create => self
                .post_and_wait(
                    ctx,
                    node,
                    &["nodes", node, "storage", storage, "content", &volid, "snapshot"],
                    &[("snapname", name.to_string())],
                )
                .await
                .map(|_| ()),
            VolumeSnapshotOp::Restore => self
                .post_and_wait(
                    ctx,
                    node,
                    &[
                        "nodes", node, "storage", storage, "content", &volid, "snapshot", name,
                        "rollback",
                    ],
                    &[],
                )
                .await
                .map(|_| ()),
            VolumeSnapshotOp::Delete => {
                self.delete_and_wait(
                    ctx,
                    node,
                    &["nodes", node, "storage", storage, "content", &volid, "snapshot", name],
                    &[],
                )
                .await
            }
        };
        result.map_err(|e| classify_volume_error(e, &volid))
    }
}

#[derive(Debug, Clone, Copy)]
enum VolumeSnapshotOp {
    Create,
    Restore,
    Delete,
}

#[async_trait]
impl GuestIpSources for ApiBackend {
    async fn vm_macs(&self, ctx: &OpContext, vmid: u32) -> BackendResult<Vec<String>> {
        let config = self.vm_config(ctx, vmid).await?;
        Ok(vm_macs(&config))
    }

    async fn agent_addresses(&self, ctx: &OpContext, vmid: u32) -> BackendResult<Vec<String>> {
        let node = self.node(ctx).await?;
        let id = vmid.to_string();
        let response: AgentNetworkResponse = self
            .client
            .get_as(ctx, &["nodes", node, "qemu", &id, "agent", "network-get-interfaces"])
            .await?;
        let interfaces = response.interfaces();
        Ok(reported_addresses(&interfaces)
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl Backend for ApiBackend {
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
        let node = self.node(ctx).await?;

        info!(template, target, node, mode = ?self.clone_mode, "cloning vm");
        let result = self
            .clone_once(ctx, node, template, target, name, self.clone_mode)
            .await;
        let result = match result {
            Err(err) if self.clone_mode == CloneMode::Linked && is_linked_clone_unsupported(&err) => {
                warn!(template, target, error = %err, "linked clone unsupported, retrying as full clone");
                self.clone_once(ctx, node, template, target, name, CloneMode::Full)
                    .await
            }
            other => other,
        };
        result.map_err(|e| classify_vm_error(e, template))
    }

    async fn configure(&self, ctx: &OpContext, vmid: VmId, config: &VmConfig) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        validate_vm_config(config)?;
        let node = self.node(ctx).await?;

        let params = config_params(config, true);
        if !params.is_empty() {
            let result = self.put_config(ctx, node, vmid, &params).await;
            match result {
                Err(err) if config.firewall_group().is_some() && is_fwgroup_schema_error(&err) => {
                    warn!(vmid, error = %err, "fwgroup rejected by hypervisor, retrying without it");
                    let params = config_params(config, false);
                    self.put_config(ctx, node, vmid, &params)
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
                let id = vmid.to_string();
                let data = self
                    .client
                    .put(
                        ctx,
                        &["nodes", node, "qemu", &id, "resize"],
                        &[("disk", plan.disk.clone()), ("size", plan.size_argument())],
                    )
                    .await
                    .map_err(|e| classify_vm_error(e, vmid))?;
                self.wait_task(ctx, node, &data).await?;
            } else {
                debug!(vmid, target_gb, "root disk already large enough");
            }
        }
        Ok(())
    }

    async fn start(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.vm_status_op(ctx, vmid, "start").await
    }

    async fn stop(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.vm_status_op(ctx, vmid, "stop").await
    }

    async fn suspend(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.vm_status_op(ctx, vmid, "suspend").await
    }

    async fn resume(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        self.vm_status_op(ctx, vmid, "resume").await
    }

    async fn destroy(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let node = self.node(ctx).await?;
        let id = vmid.to_string();
        info!(vmid, node, "destroying vm");
        self.delete_and_wait(ctx, node, &["nodes", node, "qemu", &id], &[("purge", "1".to_string())])
            .await
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn snapshot_create(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let name = SnapshotName::new(name)?;
        let node = self.node(ctx).await?;
        let id = vmid.to_string();
        self.post_and_wait(
            ctx,
            node,
            &["nodes", node, "qemu", &id, "snapshot"],
            &[("snapname", name.to_string()), ("vmstate", "0".to_string())],
        )
        .await
        .map(|_| ())
        .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn snapshot_rollback(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let name = SnapshotName::new(name)?;
        let node = self.node(ctx).await?;
        let id = vmid.to_string();
        self.post_and_wait(
            ctx,
            node,
            &["nodes", node, "qemu", &id, "snapshot", name.as_str(), "rollback"],
            &[],
        )
        .await
        .map(|_| ())
        .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn snapshot_delete(&self, ctx: &OpContext, vmid: VmId, name: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let name = SnapshotName::new(name)?;
        let node = self.node(ctx).await?;
        let id = vmid.to_string();
        self.delete_and_wait(ctx, node, &["nodes", node, "qemu", &id, "snapshot", name.as_str()], &[])
            .await
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn snapshot_list(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<Vec<Snapshot>> {
        require_vmid("vmid", vmid)?;
        let node = self.node(ctx).await?;
        let id = vmid.to_string();
        let items: Vec<SnapshotListItem> = self
            .client
            .get_as(ctx, &["nodes", node, "qemu", &id, "snapshot"])
            .await
            .map_err(|e| classify_vm_error(e, vmid))?;
        Ok(snapshots_from_list(items))
    }

    async fn status(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<VmStatus> {
        let current = self.vm_status_current(ctx, vmid).await?;
        Ok(VmStatus::from_remote(&current.status))
    }

    async fn current_stats(&self, ctx: &OpContext, vmid: VmId) -> BackendResult<VmStats> {
        let current = self.vm_status_current(ctx, vmid).await?;
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
        let node = self.node(ctx).await?;
        let id = vmid.to_string();
        let data = self
            .client
            .get(ctx, &["nodes", node, "qemu", &id, "config"], &[])
            .await
            .map_err(|e| classify_vm_error(e, vmid))?;
        match data {
            Value::Object(map) => Ok(normalize_config_map(&map)),
            Value::Null => Err(BackendError::VmNotFound(format!("vm {}: empty config", vmid))),
            other => Err(BackendError::Parse(format!(
                "vm {} config is not an object: {}",
                vmid, other
            ))),
        }
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
        let node = self.node(ctx).await?;
        info!(storage, name, size_gb, "allocating volume");
        let data = self
            .client
            .post(
                ctx,
                &["nodes", node, "storage", storage, "content"],
                &[
                    ("vmid", "0".to_string()),
                    ("filename", name.to_string()),
                    ("size", format!("{}G", size_gb)),
                ],
            )
            .await?;
        match data.as_str().map(str::trim) {
            Some(volid) if !volid.is_empty() => Ok(volid.to_string()),
            _ => Err(BackendError::Parse(format!(
                "volume allocation on {} returned no volume id",
                storage
            ))),
        }
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
        let node = self.node(ctx).await?;
        self.put_config(ctx, node, vmid, &[(slot, volume.to_string())])
            .await
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn detach_volume(&self, ctx: &OpContext, vmid: VmId, slot: &str) -> BackendResult<()> {
        require_vmid("vmid", vmid)?;
        let slot = require_slot(slot)?;
        let node = self.node(ctx).await?;
        self.put_config(ctx, node, vmid, &[("delete", slot.to_string())])
            .await
            .map_err(|e| classify_vm_error(e, vmid))
    }

    async fn delete_volume(&self, ctx: &OpContext, volume_id: &str) -> BackendResult<()> {
        let volume = VolumeId::parse(volume_id)?;
        let node = self.node(ctx).await?;
        let volid = volume.to_string();
        info!(volume = %volid, "deleting volume");
        self.delete_and_wait(
            ctx,
            node,
            &["nodes", node, "storage", volume.storage(), "content", &volid],
            &[],
        )
        .await
        .map_err(|e| classify_volume_error(e, &volid))
    }

    async fn volume_info(&self, ctx: &OpContext, volume_id: &str) -> BackendResult<VolumeInfo> {
        let volume = VolumeId::parse(volume_id)?;
        let node = self.node(ctx).await?;
        let volid = volume.to_string();
        let content: VolumeContent = self
            .client
            .get_as(ctx, &["nodes", node, "storage", volume.storage(), "content", &volid])
            .await
            .map_err(|e| classify_volume_error(e, &volid))?;
        let path = content
            .path
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| BackendError::Parse(format!("volume {} has no path", volid)))?;
        Ok(VolumeInfo {
            volume_id: content.volid.unwrap_or(volid),
            storage: volume.storage().to_string(),
            path,
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
        if let Some(shell) = &self.cli_fallback {
            return shell
                .volume_snapshot_create(ctx, volume_id, snapshot.as_str())
                .await;
        }
        self.volume_snapshot_op(ctx, &volume, &snapshot, VolumeSnapshotOp::Create)
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
        if let Some(shell) = &self.cli_fallback {
            return shell
                .volume_snapshot_restore(ctx, volume_id, snapshot.as_str())
                .await;
        }
        self.volume_snapshot_op(ctx, &volume, &snapshot, VolumeSnapshotOp::Restore)
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
        if let Some(shell) = &self.cli_fallback {
            return shell
                .volume_snapshot_delete(ctx, volume_id, snapshot.as_str())
                .await;
        }
        self.volume_snapshot_op(ctx, &volume, &snapshot, VolumeSnapshotOp::Delete)
            .await
    }

    async fn volume_clone(
        &self,
        ctx: &OpContext,
        source_volume_id: &str,
        target_name: &str,
    ) -> BackendResult<String> {
        if let Some(shell) = &self.cli_fallback {
            return shell.volume_clone(ctx, source_volume_id, target_name).await;
        }
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
        if let Some(shell) = &self.cli_fallback {
            return shell
                .volume_clone_from_snapshot(ctx, source_volume_id, snapshot.as_str(), target_name)
                .await;
        }
        self.volume_clone_inner(ctx, source_volume_id, Some(&snapshot), target_name)
            .await
    }
}
