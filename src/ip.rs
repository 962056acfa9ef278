//! IP range classification for SSRF protection.
//!
//! Pure classification with no I/O. Covers every range a storefront probe
//! must never reach: loopback, RFC1918 and CGNAT, link-local (cloud
//! metadata lives at 169.254.169.254), multicast, and the reserved blocks.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Whether `ip` falls in a private or otherwise restricted range that the
/// probe pipeline must refuse to contact.
#[must_use]
pub fn is_private_or_restricted(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_restricted_v4(v4),
        IpAddr::V6(v6) => is_restricted_v6(v6),
    }
}

fn is_restricted_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_loopback()                // 127.0.0.0/8
        || ip.is_private()          // 10/8, 172.16/12, 192.168/16
        || ip.is_link_local()       // 169.254.0.0/16
        || ip.is_multicast()        // 224.0.0.0/4
        || octets[0] == 0           // 0.0.0.0/8
        || octets[0] >= 240         // 240.0.0.0/4, includes broadcast
        || (octets[0] == 100 && (64..=127).contains(&octets[1])) // 100.64.0.0/10
}

fn is_restricted_v6(ip: Ipv6Addr) -> bool {
    // v4-mapped addresses classify as their embedded v4 address, so
    // ::ffff:127.0.0.1 cannot slip past the v4 rules.
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_restricted_v4(mapped);
    }
    let seg0 = ip.segments()[0];
    ip.is_loopback()                    // ::1
        || ip.is_unspecified()          // ::
        || ip.is_multicast()            // ff00::/8
        || (seg0 & 0xffc0) == 0xfe80    // fe80::/10
        || (seg0 & 0xfe00) == 0xfc00    // fc00::/7
}

/// Loopback across both families, including the v4-mapped form.
pub(crate) fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}
