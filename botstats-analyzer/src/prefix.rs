//! Prefix arithmetic and block targets.
//!
//! Suspicious addresses are grouped by their containing /24 (IPv4) or /64
//! (IPv6). IPv4 /24 groups may in turn be consolidated into their /16.

use std::fmt;
use std::net::IpAddr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::Serialize;

/// Grouping prefix length for IPv4 addresses.
pub const IPV4_GROUP_PREFIX_LEN: u8 = 24;

/// Grouping prefix length for IPv6 addresses.
pub const IPV6_GROUP_PREFIX_LEN: u8 = 64;

/// Supernet prefix length used for IPv4 consolidation.
pub const IPV4_SUPERNET_PREFIX_LEN: u8 = 16;

/// The grouping prefix containing `address`, with host bits cleared.
pub fn containing_prefix(address: IpAddr) -> IpNet {
    match address {
        IpAddr::V4(v4) => IpNet::V4(
            Ipv4Net::new(v4, IPV4_GROUP_PREFIX_LEN)
                .expect("/24 is a valid IPv4 prefix length")
                .trunc(),
        ),
        IpAddr::V6(v6) => IpNet::V6(
            Ipv6Net::new(v6, IPV6_GROUP_PREFIX_LEN)
                .expect("/64 is a valid IPv6 prefix length")
                .trunc(),
        ),
    }
}

/// The /16 containing an IPv4 /24 group prefix.
///
/// Returns `None` for IPv6 prefixes and for IPv4 prefixes that are not /24.
pub fn ipv4_supernet(prefix: &IpNet) -> Option<IpNet> {
    match prefix {
        IpNet::V4(v4) if v4.prefix_len() == IPV4_GROUP_PREFIX_LEN => {
            Ipv4Net::new(v4.network(), IPV4_SUPERNET_PREFIX_LEN)
                .ok()
                .map(|net| IpNet::V4(net.trunc()))
        }
        _ => None,
    }
}

/// Whether `network` covers exactly one address.
pub fn is_host(network: &IpNet) -> bool {
    network.prefix_len() == network.max_prefix_len()
}

/// An address or prefix submitted for a temporary block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockTarget {
    pub network: IpNet,
    pub duration_minutes: u64,
}

impl BlockTarget {
    /// Block a single address.
    pub fn address(address: IpAddr, duration_minutes: u64) -> Self {
        Self {
            network: IpNet::from(address),
            duration_minutes,
        }
    }

    /// Block a whole prefix.
    pub fn network(network: IpNet, duration_minutes: u64) -> Self {
        Self {
            network: network.trunc(),
            duration_minutes,
        }
    }

    /// Whether this target is a single address.
    pub fn is_address(&self) -> bool {
        is_host(&self.network)
    }
}

impl fmt::Display for BlockTarget {
    /// Host targets print as a bare address, prefixes in CIDR notation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_address() {
            write!(f, "{}", self.network.addr())
        } else {
            write!(f, "{}", self.network)
        }
    }
}
