//! Eligibility and preference rules for guest-reported addresses.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Parses an agent-reported address and keeps it only if it is a usable
/// IPv4 unicast address (not loopback, link-local or unspecified).
pub fn eligible_ipv4(address: &str) -> Option<Ipv4Addr> {
    let address = address.trim();
    let address = address.split_once('/').map(|(ip, _)| ip).unwrap_or(address);
    let ip: Ipv4Addr = address.parse().ok()?;
    if ip.is_loopback() || ip.is_link_local() || ip.is_unspecified() {
        return None;
    }
    Some(ip)
}

/// Picks the preferred address: inside `cidr` first, then the first
/// RFC 1918 address, then the first candidate.
pub fn select_ip(candidates: &[Ipv4Addr], cidr: Option<&Ipv4Net>) -> Option<Ipv4Addr> {
    if let Some(net) = cidr {
        if let Some(ip) = candidates.iter().find(|ip| net.contains(*ip)) {
            return Some(*ip);
        }
    }
    candidates
        .iter()
        .find(|ip| ip.is_private())
        .or_else(|| candidates.first())
        .copied()
}

/// Filters raw address strings and applies [`select_ip`].
pub fn select_from_reported<'a, I>(addresses: I, cidr: Option<&Ipv4Net>) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = &'a str>,
{
    let candidates: Vec<Ipv4Addr> = addresses.into_iter().filter_map(eligible_ipv4).collect();
    select_ip(&candidates, cidr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility() {
        assert_eq!(eligible_ipv4("10.77.0.9"), Some("10.77.0.9".parse().unwrap()));
        assert_eq!(eligible_ipv4("10.77.0.9/16"), Some("10.77.0.9".parse().unwrap()));
        assert_eq!(eligible_ipv4("127.0.0.1"), None);
        assert_eq!(eligible_ipv4("169.254.10.1"), None);
        assert_eq!(eligible_ipv4("0.0.0.0"), None);
        assert_eq!(eligible_ipv4("fe80::1"), None);
        assert_eq!(eligible_ipv4("garbage"), None);
    }

    #[test]
    fn test_cidr_preferred() {
        let net: Ipv4Net = "10.77.0.0/16".parse().unwrap();
        let picked = select_from_reported(["127.0.0.1", "192.168.1.10", "10.77.0.9"], Some(&net));
        assert_eq!(picked, Some("10.77.0.9".parse().unwrap()));
    }

    #[test]
    fn test_private_preferred_over_public() {
        let picked = select_from_reported(["203.0.113.7", "172.16.4.2"], None);
        assert_eq!(picked, Some("172.16.4.2".parse().unwrap()));

        // Unmatched CIDR falls through to the private rule.
        let net: Ipv4Net = "10.77.0.0/16".parse().unwrap();
        let picked = select_from_reported(["203.0.113.7", "192.168.1.10"], Some(&net));
        assert_eq!(picked, Some("192.168.1.10".parse().unwrap()));
    }

    #[test]
    fn test_first_eligible_fallback() {
        let picked = select_from_reported(["fe80::1", "203.0.113.7", "198.51.100.1"], None);
        assert_eq!(picked, Some("203.0.113.7".parse().unwrap()));
        assert_eq!(select_from_reported(["127.0.0.1"], None), None);
    }
}
