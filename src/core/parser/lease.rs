//! DHCP lease file parsing (dnsmasq and ISC dhcpd formats).

use chrono::Utc;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Finds the address leased to `mac` in a lease file of either format.
///
/// Brace-delimited content is treated as ISC dhcpd, anything else as
/// dnsmasq. `net`, when given, restricts matches to that netblock.
pub fn find_lease(content: &str, mac: &str, net: Option<&Ipv4Net>) -> Option<Ipv4Addr> {
    if content.contains('{') {
        find_dhcpd_lease(content, mac, net)
    } else {
        find_dnsmasq_lease(content, mac, net)
    }
}

fn in_net(ip: &Ipv4Addr, net: Option<&Ipv4Net>) -> bool {
    net.map(|net| net.contains(ip)).unwrap_or(true)
}

/// dnsmasq: `<expiry> <mac> <ip> <hostname> <client-id>` per line.
///
/// Leases whose expiry has passed are ignored; an expiry of `0` never ends.
/// The last matching lease wins, since dnsmasq appends renewals.
pub fn find_dnsmasq_lease(content: &str, mac: &str, net: Option<&Ipv4Net>) -> Option<Ipv4Addr> {
    find_dnsmasq_lease_at(content, mac, net, Utc::now().timestamp())
}

fn find_dnsmasq_lease_at(
    content: &str,
    mac: &str,
    net: Option<&Ipv4Net>,
    now: i64,
) -> Option<Ipv4Addr> {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 || !fields[1].eq_ignore_ascii_case(mac) {
                return None;
            }
            let expiry = fields[0].parse::<i64>().ok()?;
            if expiry != 0 && expiry < now {
                return None;
            }
            fields[2].parse::<Ipv4Addr>().ok()
        })
        .filter(|ip| in_net(ip, net))
        .last()
}

/// ISC dhcpd: `lease <ip> { ... hardware ethernet <mac>; binding state active; ... }`.
///
/// Comment lines are dropped and only `lease` declarations are read. A lease
/// matches on MAC; when a `binding state` line is present it must be
/// `active`. Later blocks supersede earlier ones.
pub fn find_dhcpd_lease(content: &str, mac: &str, net: Option<&Ipv4Net>) -> Option<Ipv4Addr> {
    let mac = mac.to_ascii_lowercase();
    let statements = content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let mut found = None;
    let mut rest = statements.as_str();
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        // Top-level statements such as `server-duid ...;` may precede the declaration.
        let header = rest[..open].rsplit(';').next().unwrap_or_default().trim();
        let body = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        let Some(ip) = header
            .strip_prefix("lease ")
            .and_then(|addr| addr.trim().parse::<Ipv4Addr>().ok())
        else {
            continue;
        };

        let mut hardware = None;
        let mut binding = None;
        for statement in body.split(';').map(str::trim) {
            if let Some(value) = statement.strip_prefix("hardware ethernet") {
                hardware = Some(value.trim().to_ascii_lowercase());
            } else if let Some(value) = statement.strip_prefix("binding state") {
                binding = Some(value.trim().to_ascii_lowercase());
            }
        }

        if hardware.as_deref() != Some(mac.as_str()) {
            continue;
        }
        if binding.as_deref().is_some_and(|state| state != "active") {
            continue;
        }
        if in_net(&ip, net) {
            found = Some(ip);
        }
    }

    found
}
