//! Guest IPv4 discovery: one bounded poll loop racing the guest agent
//! against DHCP lease files.

use crate::core::domain::context::OpContext;
use crate::core::domain::error::{BackendError, BackendResult};
use crate::core::guest_ip::lease_paths::expand_lease_paths;
use crate::core::guest_ip::selection::select_from_reported;
use crate::core::parser::classify::is_guest_agent_not_running;
use crate::core::parser::lease::find_lease;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts made when the caller's context carries no deadline.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// The two transport-specific inputs of the discovery loop.
#[async_trait]
pub trait GuestIpSources: Send + Sync {
    /// MAC addresses of the VM's NICs, read once per discovery.
    async fn vm_macs(&self, ctx: &OpContext, vmid: u32) -> BackendResult<Vec<String>>;

    /// Raw address strings reported by the guest agent.
    async fn agent_addresses(&self, ctx: &OpContext, vmid: u32) -> BackendResult<Vec<String>>;
}

/// Tuning for one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub agent_cidr: Option<Ipv4Net>,
    pub lease_paths: Vec<String>,
    pub initial_wait: Duration,
    pub max_wait: Duration,
    pub max_attempts: u32,
}

impl DiscoveryOptions {
    /// Timing used by the HTTP transport (250 ms doubling to 2 s).
    pub fn api(agent_cidr: Option<Ipv4Net>, lease_paths: Vec<String>) -> Self {
        Self {
            agent_cidr,
            lease_paths,
            initial_wait: Duration::from_millis(250),
            max_wait: Duration::from_secs(2),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Timing used by the CLI transport (500 ms doubling to 10 s).
    pub fn shell(agent_cidr: Option<Ipv4Net>, lease_paths: Vec<String>) -> Self {
        Self {
            agent_cidr,
            lease_paths,
            initial_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(10),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

enum Exhausted {
    Budget,
}

/// Runs the discovery loop.
///
/// Each iteration searches the lease files for every known MAC, then asks
/// the guest agent; the first hit wins. Without a deadline the loop stops
/// after `max_attempts`; with one it runs until the deadline. Explicit
/// cancellation is returned as is; running out of budget (attempts or
/// deadline) yields [`BackendError::GuestIpNotFound`] naming both sources'
/// last failure.
pub async fn discover_guest_ip(
    ctx: &OpContext,
    vmid: u32,
    sources: &(dyn GuestIpSources + '_),
    options: &DiscoveryOptions,
) -> BackendResult<Ipv4Addr> {
    let mut lease_failure = String::from("no lease lookup attempted");
    let mut agent_failure = String::from("no agent query attempted");

    let macs = match sources.vm_macs(ctx, vmid).await {
        Ok(macs) => {
            if macs.is_empty() {
                lease_failure = "vm config lists no MAC addresses".to_string();
            }
            macs
        }
        Err(BackendError::Cancelled) => return Err(BackendError::Cancelled),
        Err(BackendError::DeadlineExceeded) => {
            return Err(not_found(vmid, "deadline exceeded", "deadline exceeded"));
        }
        Err(err) => {
            warn!(vmid, error = %err, "vm config unavailable, dhcp lease lookup disabled");
            lease_failure = format!("vm config unavailable: {}", err);
            Vec::new()
        }
    };

    let bounded = ctx.deadline().is_some();
    let mut wait = options.initial_wait;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        if !macs.is_empty() {
            match lookup_leases(ctx, &options.lease_paths, &macs, options.agent_cidr.as_ref()).await
            {
                Ok(Some(ip)) => {
                    debug!(vmid, %ip, attempt, "guest ip found in dhcp leases");
                    return Ok(ip);
                }
                Ok(None) => {
                    lease_failure = format!("no active lease for {}", macs.join(", "));
                }
                Err(err) => match exhausted(err)? {
                    Exhausted::Budget => break,
                },
            }
        }

        match sources.agent_addresses(ctx, vmid).await {
            Ok(addresses) => {
                match select_from_reported(
                    addresses.iter().map(String::as_str),
                    options.agent_cidr.as_ref(),
                ) {
                    Some(ip) => {
                        debug!(vmid, %ip, attempt, "guest ip reported by agent");
                        return Ok(ip);
                    }
                    None => {
                        agent_failure = "agent reported no eligible ipv4 address".to_string();
                    }
                }
            }
            Err(err) if err.is_cancelled() => match exhausted(err)? {
                Exhausted::Budget => break,
            },
            Err(err) if is_guest_agent_not_running(&err) => {
                agent_failure = "guest agent is not running".to_string();
            }
            Err(err) => {
                agent_failure = err.to_string();
            }
        }

        if !bounded && attempt >= options.max_attempts {
            break;
        }

        if let Err(err) = ctx.sleep(wait).await {
            match exhausted(err)? {
                Exhausted::Budget => break,
            }
        }
        wait = (wait * 2).min(options.max_wait);
    }

    Err(not_found(vmid, &agent_failure, &lease_failure))
}

/// Separates deadline expiry (budget spent) from every other error, which
/// propagates unchanged.
fn exhausted(err: BackendError) -> BackendResult<Exhausted> {
    match err {
        BackendError::DeadlineExceeded => Ok(Exhausted::Budget),
        other => Err(other),
    }
}

fn not_found(vmid: u32, agent: &str, lease: &str) -> BackendError {
    BackendError::GuestIpNotFound {
        vmid,
        agent: agent.to_string(),
        lease: lease.to_string(),
    }
}

/// Searches every lease file for every MAC. Missing files are skipped;
/// unreadable ones are logged and skipped.
async fn lookup_leases(
    ctx: &OpContext,
    patterns: &[String],
    macs: &[String],
    cidr: Option<&Ipv4Net>,
) -> BackendResult<Option<Ipv4Addr>> {
    for path in expand_lease_paths(patterns) {
        let Some(content) = read_lease_file(ctx, &path).await? else {
            continue;
        };
        for mac in macs {
            if let Some(ip) = find_lease(&content, mac, cidr) {
                return Ok(Some(ip));
            }
        }
    }
    Ok(None)
}

async fn read_lease_file(ctx: &OpContext, path: &Path) -> BackendResult<Option<String>> {
    let read = ctx
        .run(async {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|err| BackendError::io(format!("read {}", path.display()), err))
        })
        .await;
    match read {
        Ok(content) => Ok(Some(content)),
        Err(BackendError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            Ok(None)
        }
        Err(err @ BackendError::Io { .. }) => {
            debug!(path = %path.display(), error = %err, "skipping unreadable lease file");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
