//! Per-VM cloud-init user-data files in the hypervisor's snippets directory.

use crate::core::domain::context::OpContext;
use crate::core::domain::error::{BackendError, BackendResult, ValidationError};
use crate::core::domain::model::backend_config::SnippetStoreConfig;
use crate::core::domain::value_object::{Hostname, validate_storage_name};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const FILENAME_ATTEMPTS: usize = 5;
const BOOTSTRAP_PATH: &str = "/etc/agentlab/bootstrap.json";

/// What goes into a VM's user-data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetInput {
    pub vmid: u32,
    /// Defaults to `sandbox-{vmid}`.
    pub hostname: Option<String>,
    pub ssh_public_key: String,
    pub bootstrap_token: String,
    pub controller_url: String,
}

/// A written snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub vmid: u32,
    pub path: PathBuf,
    /// `{storage}:snippets/{filename}`, ready for `VmConfig::cloud_init`.
    pub storage_ref: String,
}

#[derive(Serialize)]
struct BootstrapPayload<'a> {
    token: &'a str,
    controller: &'a str,
    vmid: u32,
}

/// Writes and removes snippet files.
#[derive(Debug, Clone)]
pub struct SnippetStore {
    dir: PathBuf,
    storage: String,
}

impl SnippetStore {
    pub fn new(config: SnippetStoreConfig) -> BackendResult<Self> {
        if !config.dir.is_absolute() {
            return Err(BackendError::field(
                "dir",
                format!("{} is not an absolute path", config.dir.display()),
            ));
        }
        let storage = config.storage.trim().to_string();
        validate_storage_name(&storage)?;
        Ok(Self {
            dir: config.dir,
            storage,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates a new, exclusively owned (mode 0600) snippet for `input.vmid`.
    pub async fn create(&self, ctx: &OpContext, input: &SnippetInput) -> BackendResult<Snippet> {
        let content = render_user_data(input)?;

        for attempt in 1..=FILENAME_ATTEMPTS {
            let filename = snippet_filename(input.vmid);
            let path = self.dir.join(&filename);
            let file = ctx.run(async { open_exclusive(&path).await }).await;
            let mut file = match file {
                Ok(file) => file,
                Err(BackendError::Io { source, .. }) if source.kind() == ErrorKind::AlreadyExists => {
                    debug!(vmid = input.vmid, attempt, filename = %filename, "snippet name taken");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let written = ctx
                .run(async {
                    self.ensure_contained(&path).await?;
                    file.write_all(content.as_bytes())
                        .await
                        .map_err(|e| BackendError::io(format!("failed to write {}", path.display()), e))?;
                    file.sync_all()
                        .await
                        .map_err(|e| BackendError::io(format!("failed to sync {}", path.display()), e))
                })
                .await;
            if let Err(err) = written {
                drop(file);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "failed to remove partial snippet");
                }
                return Err(err);
            }

            info!(vmid = input.vmid, path = %path.display(), "wrote cloud-init snippet");
            return Ok(Snippet {
                vmid: input.vmid,
                storage_ref: format!("{}:snippets/{}", self.storage, filename),
                path,
            });
        }

        Err(BackendError::io(
            format!("no free snippet filename in {}", self.dir.display()),
            std::io::Error::new(ErrorKind::AlreadyExists, "filename attempts exhausted"),
        ))
    }

    /// Removes a snippet; an already missing file is not an error.
    pub async fn delete(&self, ctx: &OpContext, snippet: &Snippet) -> BackendResult<()> {
        let path = snippet.path.as_path();
        ctx.run(async {
            match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(BackendError::io(format!("failed to remove {}", path.display()), e)),
            }
        })
        .await
    }

    // The created file must resolve to a direct child of the snippets dir.
    async fn ensure_contained(&self, path: &Path) -> BackendResult<()> {
        let base = tokio::fs::canonicalize(&self.dir)
            .await
            .map_err(|e| BackendError::io(format!("failed to resolve {}", self.dir.display()), e))?;
        let resolved = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| BackendError::io(format!("failed to resolve {}", path.display()), e))?;
        if resolved.parent() != Some(base.as_path()) {
            return Err(ValidationError::ConstraintViolation(format!(
                "snippet path {} escapes {}",
                resolved.display(),
                base.display()
            ))
            .into());
        }
        Ok(())
    }
}

async fn open_exclusive(path: &Path) -> BackendResult<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options
        .open(path)
        .await
        .map_err(|e| BackendError::io(format!("failed to create {}", path.display()), e))
}

fn snippet_filename(vmid: u32) -> String {
    let suffix: [u8; 8] = rand::random();
    format!("agentlab-{}-{}.yaml", vmid, hex::encode(suffix))
}

fn require_line(field: &str, value: &str) -> BackendResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BackendError::field(field, "cannot be empty"));
    }
    if value.contains(['\n', '\r']) {
        return Err(BackendError::field(field, "must be a single line"));
    }
    Ok(value.to_string())
}

// YAML accepts JSON strings as double-quoted scalars.
fn quoted(value: &str) -> BackendResult<String> {
    serde_json::to_string(value).map_err(|e| BackendError::Parse(e.to_string()))
}

/// Renders the `#cloud-config` document for `input`.
pub(crate) fn render_user_data(input: &SnippetInput) -> BackendResult<String> {
    if input.vmid == 0 {
        return Err(BackendError::field("vmid", "must be greater than zero"));
    }
    let hostname = match input.hostname.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Hostname::new(name)?,
        _ => Hostname::default_for_vm(input.vmid),
    };
    let ssh_key = require_line("ssh_public_key", &input.ssh_public_key)?;
    let token = require_line("bootstrap_token", &input.bootstrap_token)?;
    let controller = require_line("controller_url", &input.controller_url)?;

    let bootstrap = serde_json::to_string(&BootstrapPayload {
        token: &token,
        controller: &controller,
        vmid: input.vmid,
    })
    .map_err(|e| BackendError::Parse(e.to_string()))?;

    let hostname = quoted(hostname.as_str())?;
    let ssh_key = quoted(&ssh_key)?;
    let bootstrap = quoted(&bootstrap)?;

    Ok(format!(
        r#"#cloud-config
hostname: {hostname}
manage_etc_hosts: true
ssh_pwauth: false
disable_root: true
users:
  - name: agent
    groups: [sudo]
    shell: /bin/bash
    sudo: "ALL=(ALL) NOPASSWD:ALL"
    lock_passwd: true
    ssh_authorized_keys:
      - {ssh_key}
growpart:
  mode: auto
  devices: ["/"]
resize_rootfs: true
write_files:
  - path: {BOOTSTRAP_PATH}
    owner: "root:root"
    permissions: "0600"
    content: {bootstrap}
runcmd:
  - [sh, -c, "command -v qemu-ga >/dev/null || (apt-get update && apt-get install -y qemu-guest-agent) || true"]
  - [sh, -c, "systemctl enable --now qemu-guest-agent || true"]
  - [sh, -c, "systemctl enable --now ssh || true"]
"#
    ))
}
