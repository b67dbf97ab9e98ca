//! Construction-time settings for the backends and the snippet store.
//!
//! All structs deserialize with serde so callers can load them from their
//! own configuration files; the crate itself never reads files or the
//! environment.

use crate::core::domain::value_object::serde_helpers::duration_secs;
use crate::core::guest_ip::lease_paths::default_lease_paths;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default bound on each CLI invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_SNIPPETS_DIR: &str = "/var/lib/vz/snippets";
pub const DEFAULT_SNIPPET_STORAGE: &str = "local";

/// How templates are cloned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneMode {
    /// Share blocks with the template; falls back to a full clone when the
    /// template's storage cannot do it.
    Linked,
    #[default]
    Full,
}

impl CloneMode {
    /// Value of the `full` clone parameter.
    pub fn full_flag(self) -> &'static str {
        match self {
            CloneMode::Linked => "0",
            CloneMode::Full => "1",
        }
    }
}

/// Configuration for API rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of requests per second.
    pub requests_per_second: u32,
    /// Maximum burst size (number of requests that can be sent immediately).
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

/// Settings of the HTTP API transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiBackendConfig {
    /// `https://host:8006/api2/json`; a bare `https://host:8006` is completed.
    pub base_url: String,
    /// `USER@REALM!TOKENID=SECRET`.
    pub token: String,
    /// Target node; auto-detected from `/nodes` when empty.
    pub node: String,
    pub verify_tls: bool,
    /// PEM bundle trusted in addition to the system roots.
    pub ca_bundle_path: Option<PathBuf>,
    pub clone_mode: CloneMode,
    pub agent_cidr: Option<Ipv4Net>,
    pub dhcp_lease_paths: Vec<String>,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ApiBackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            node: String::new(),
            verify_tls: true,
            ca_bundle_path: None,
            clone_mode: CloneMode::default(),
            agent_cidr: None,
            dhcp_lease_paths: default_lease_paths(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limit: None,
        }
    }
}

/// Settings of the CLI transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellBackendConfig {
    /// Target node; auto-detected through `pvesh get /nodes` when empty.
    pub node: String,
    pub qm_path: String,
    pub pvesh_path: String,
    pub pvesm_path: String,
    /// Run tools through `bash -c 'exec "$@"'` to inherit a login-like
    /// environment (PATH from profile scripts).
    pub use_bash: bool,
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,
    pub clone_mode: CloneMode,
    pub agent_cidr: Option<Ipv4Net>,
    pub dhcp_lease_paths: Vec<String>,
}

impl Default for ShellBackendConfig {
    fn default() -> Self {
        Self {
            node: String::new(),
            qm_path: "qm".to_string(),
            pvesh_path: "pvesh".to_string(),
            pvesm_path: "pvesm".to_string(),
            use_bash: false,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            clone_mode: CloneMode::default(),
            agent_cidr: None,
            dhcp_lease_paths: default_lease_paths(),
        }
    }
}

/// Settings of the cloud-init snippet store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetStoreConfig {
    /// Absolute directory the storage exposes as `snippets/`.
    pub dir: PathBuf,
    /// Storage name used in the returned reference.
    pub storage: String,
}

impl Default for SnippetStoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SNIPPETS_DIR),
            storage: DEFAULT_SNIPPET_STORAGE.to_string(),
        }
    }
}
