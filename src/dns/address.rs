//! Address ranges a production resolver must never hand back.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// True if `ip` falls inside loopback, private, or otherwise non-public space.
pub fn is_restricted(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_restricted_v4(v4),
        IpAddr::V6(v6) => is_restricted_v6(v6),
    }
}

fn is_restricted_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || a == 0
        // Carrier-grade NAT, 100.64.0.0/10
        || (a == 100 && (b & 0xc0) == 64)
        // IETF protocol assignments, 192.0.0.0/24
        || (a == 192 && b == 0 && c == 0)
        // Benchmarking, 198.18.0.0/15
        || (a == 198 && (b & 0xfe) == 18)
        // Reserved, 240.0.0.0/4
        || a >= 240
}

fn is_restricted_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_restricted_v4(mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // Unique local, fc00::/7
        || (first & 0xfe00) == 0xfc00
        // Link local, fe80::/10
        || (first & 0xffc0) == 0xfe80
        // Documentation, 2001:db8::/32
        || (first == 0x2001 && ip.segments()[1] == 0x0db8)
}
