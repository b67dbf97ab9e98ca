//! Proxmox VE backend for provisioning short-lived sandbox VMs.
//!
//! Three interchangeable implementations of [`Backend`]:
//!
//! - [`ApiBackend`] speaks the HTTP API with an API token,
//! - [`ShellBackend`] drives `qm`, `pvesh` and `pvesm` on the node,
//! - [`FakeBackend`] keeps everything in memory for callers' tests.
//!
//! Every operation takes an [`OpContext`] carrying cancellation and an
//! optional deadline. Writes that queue a hypervisor task return only once
//! the task has finished successfully.
//!
//! ```no_run
//! use agentlab_proxmox::{
//!     Backend, BackendResult, OpContext, ShellBackend, ShellBackendConfig, SnippetInput,
//!     SnippetStore, SnippetStoreConfig, VmConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> BackendResult<()> {
//!     let backend = ShellBackend::new(ShellBackendConfig::default())?;
//!     let snippets = SnippetStore::new(SnippetStoreConfig::default())?;
//!     let ctx = OpContext::new();
//!
//!     backend.validate_template(&ctx, 9000).await?;
//!     backend.clone_vm(&ctx, 9000, 101, "sandbox-101").await?;
//!
//!     let snippet = snippets
//!         .create(
//!             &ctx,
//!             &SnippetInput {
//!                 vmid: 101,
//!                 hostname: None,
//!                 ssh_public_key: "ssh-ed25519 AAAA... agent".to_string(),
//!                 bootstrap_token: "token".to_string(),
//!                 controller_url: "http://10.77.0.1:8844".to_string(),
//!             },
//!         )
//!         .await?;
//!     let config = VmConfig {
//!         cores: Some(2),
//!         memory_mb: Some(4096),
//!         cloud_init: Some(snippet.storage_ref.clone()),
//!         root_disk_gb: Some(40),
//!         ..Default::default()
//!     };
//!     backend.configure(&ctx, 101, &config).await?;
//!     backend.start(&ctx, 101).await?;
//!     println!("{}", backend.guest_ip(&ctx, 101).await?);
//!     Ok(())
//! }
//! ```

mod core;

pub use crate::core::domain::backend::Backend;
pub use crate::core::domain::context::OpContext;
pub use crate::core::domain::error::{
    BackendError, BackendResult, CommandFailureInfo, ValidationError,
};
pub use crate::core::domain::model::backend_config::{
    ApiBackendConfig, CloneMode, DEFAULT_COMMAND_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SNIPPET_STORAGE, DEFAULT_SNIPPETS_DIR, RateLimitConfig, ShellBackendConfig,
    SnippetStoreConfig,
};
pub use crate::core::domain::model::snapshot::Snapshot;
pub use crate::core::domain::model::task::{TaskHandle, TaskStatus};
pub use crate::core::domain::model::vm::{VmConfig, VmId, VmStats, VmStatus};
pub use crate::core::domain::model::volume::VolumeInfo;
pub use crate::core::domain::value_object::{
    ApiToken, ApiUrl, Hostname, HostnameConfig, SnapshotName, VolumeId,
};
pub use crate::core::guest_ip::{
    DEFAULT_DHCP_LEASE_PATHS, default_lease_paths, eligible_ipv4, expand_lease_paths, select_ip,
};
pub use crate::core::infrastructure::api_backend::{ApiBackend, ApiBackendBuilder};
pub use crate::core::infrastructure::command::{
    BashRunner, CommandRunner, ExecRunner, display_command, quote_for_display, validate_arg,
};
pub use crate::core::infrastructure::fake_backend::{FakeBackend, fake_guest_ip};
pub use crate::core::infrastructure::shell_backend::ShellBackend;
pub use crate::core::infrastructure::snippet_store::{Snippet, SnippetInput, SnippetStore};
pub use crate::core::infrastructure::task_waiter::{TaskStatusSource, TaskWaiter};
pub use crate::core::infrastructure::vm_params::config_params;

/// Parsers for hypervisor-native text formats (config lines, disk sizes,
/// NIC specs, DHCP leases, error wording).
pub mod parser {
    pub use crate::core::parser::classify::{
        classify_vm_error, classify_volume_error, is_fwgroup_schema_error,
        is_guest_agent_not_running, is_linked_clone_unsupported,
    };
    pub use crate::core::parser::config::{
        agent_enabled, cicustom_value, detect_root_disk, has_cloud_init_drive, parse_config_lines,
    };
    pub use crate::core::parser::disk::{ResizePlan, parse_size_gb, plan_root_disk_resize, resize_delta};
    pub use crate::core::parser::lease::find_lease;
    pub use crate::core::parser::net::{build_net0, mac_from_net, vm_macs};
}

#[cfg(test)]
mod tests;
