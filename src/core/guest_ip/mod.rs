//! Guest IPv4 discovery shared by both transports.

pub mod discovery;
pub mod lease_paths;
pub mod selection;

pub use discovery::{DiscoveryOptions, GuestIpSources, discover_guest_ip};
pub use lease_paths::{DEFAULT_DHCP_LEASE_PATHS, default_lease_paths, expand_lease_paths};
pub use selection::{eligible_ipv4, select_ip};
