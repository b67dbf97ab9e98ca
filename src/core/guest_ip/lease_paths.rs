//! DHCP lease file locations.

use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

/// Typical dnsmasq and ISC dhcpd lease locations searched by default.
pub const DEFAULT_DHCP_LEASE_PATHS: [&str; 6] = [
    "/var/lib/misc/dnsmasq.leases",
    "/var/lib/dnsmasq/dnsmasq.leases",
    "/var/lib/dnsmasq/*.leases",
    "/var/lib/dhcp/dhcpd.leases",
    "/var/lib/dhcpd/dhcpd.leases",
    "/var/lib/misc/*.leases",
];

pub fn default_lease_paths() -> Vec<String> {
    DEFAULT_DHCP_LEASE_PATHS.iter().map(|p| p.to_string()).collect()
}

fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expands glob patterns into concrete paths, deduplicated and sorted.
///
/// Literal paths are kept even if missing (readers skip absent files);
/// patterns contribute only the files they currently match.
pub fn expand_lease_paths(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = BTreeSet::new();
    for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        if !has_glob_meta(pattern) {
            paths.insert(PathBuf::from(pattern));
            continue;
        }
        match glob::glob(pattern) {
            Ok(entries) => paths.extend(entries.filter_map(Result::ok)),
            Err(err) => debug!(pattern, error = %err, "ignoring invalid lease path pattern"),
        }
    }
    paths.into_iter().collect()
}
