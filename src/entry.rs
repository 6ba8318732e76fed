//! Body parsing and CIDR expansion for list files.

use ipnet::{IpAddrRange, IpNet, Ipv4AddrRange, Ipv6AddrRange};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ImporterError;

/// How CIDR blocks are turned into documents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CidrMode {
    /// One document per host address, network and broadcast included
    Hosts,
    /// One document per block, keeping the literal CIDR
    Range,
}

/// Address carried by a single document: a host or a network, never both
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Host(String),
    Network(String),
}

impl Address {
    /// Address without the `/prefix` suffix for networks.
    pub fn key(&self) -> &str {
        match self {
            Address::Host(ip) => ip,
            Address::Network(cidr) => cidr.split_once('/').map_or(cidr.as_str(), |(ip, _)| ip),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Host(ip) => f.write_str(ip),
            Address::Network(cidr) => f.write_str(cidr),
        }
    }
}

/// One body line of a list file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressEntry {
    Single(String),
    Block { cidr: String, net: IpNet },
}

impl AddressEntry {
    /// Classify a stripped body line. Single addresses are kept verbatim;
    /// blocks must parse as CIDR.
    pub fn parse(line: &str) -> Result<Self, ImporterError> {
        let line = line.trim();
        if line.contains('/') {
            let net = line
                .parse::<IpNet>()
                .map_err(|_| ImporterError::InvalidEntry(line.to_string()))?;
            Ok(AddressEntry::Block {
                cidr: line.to_string(),
                net,
            })
        } else {
            Ok(AddressEntry::Single(line.to_string()))
        }
    }

    /// Addresses this entry produces under `mode`, in ascending order for blocks.
    pub fn addresses(&self, mode: CidrMode) -> Box<dyn Iterator<Item = Address> + Send + '_> {
        match (self, mode) {
            (AddressEntry::Single(ip), _) => Box::new(std::iter::once(Address::Host(ip.clone()))),
            (AddressEntry::Block { cidr, .. }, CidrMode::Range) => {
                Box::new(std::iter::once(Address::Network(cidr.clone())))
            }
            (AddressEntry::Block { net, .. }, CidrMode::Hosts) => {
                Box::new(expand_hosts(net).map(|ip| Address::Host(ip.to_string())))
            }
        }
    }
}

/// Every address of `net`, network and broadcast addresses included.
///
/// Unlike [`IpNet::hosts`], nothing is excluded: a /30 yields four addresses.
pub fn expand_hosts(net: &IpNet) -> IpAddrRange {
    match net {
        IpNet::V4(v4) => IpAddrRange::V4(Ipv4AddrRange::new(v4.network(), v4.broadcast())),
        IpNet::V6(v6) => IpAddrRange::V6(Ipv6AddrRange::new(v6.network(), v6.broadcast())),
    }
}

/// Number of addresses `net` expands to, saturating for huge IPv6 blocks.
pub fn block_size(net: &IpNet) -> u128 {
    let shift = u32::from(net.max_prefix_len() - net.prefix_len());
    1u128.checked_shl(shift).unwrap_or(u128::MAX)
}

/// Body lines of a list file: comment lines (first non-blank char `#`) and
/// blank lines are dropped, the rest is trimmed and kept in order.
pub fn body_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Remove comments and blank lines, joining the remaining lines with `\n`.
pub fn strip_comments(content: &str) -> String {
    body_lines(content).collect::<Vec<_>>().join("\n")
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ipv4_cidr_strategy() -> impl Strategy<Value = String> {
        (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255, 20u8..=32)
            .prop_map(|(a, b, c, d, prefix)| format!("{}.{}.{}.{}/{}", a, b, c, d, prefix))
    }

    fn list_content_strategy(max_lines: usize) -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                ipv4_cidr_strategy(),
                Just("# comment".to_string()),
                Just("   #indented".to_string()),
                Just("".to_string()),
                Just("  ".to_string()),
                Just("198.51.100.1".to_string()),
            ],
            0..max_lines,
        )
        .prop_map(|lines| lines.join("\n"))
    }

    proptest! {
        /// A block of size N expands to exactly N ascending addresses
        #[test]
        fn prop_expand_hosts_is_total_and_ascending(cidr in ipv4_cidr_strategy()) {
            let net: IpNet = cidr.parse().unwrap();
            let addrs: Vec<_> = expand_hosts(&net).collect();
            prop_assert_eq!(addrs.len() as u128, block_size(&net));
            prop_assert_eq!(addrs.first().copied(), Some(net.network()));
            prop_assert_eq!(addrs.last().copied(), Some(net.broadcast()));
            prop_assert!(addrs.windows(2).all(|w| w[0] < w[1]));
        }

        /// Range mode always yields exactly the input string
        #[test]
        fn prop_range_mode_identity(cidr in ipv4_cidr_strategy()) {
            let entry = AddressEntry::parse(&cidr).unwrap();
            let out: Vec<_> = entry.addresses(CidrMode::Range).collect();
            prop_assert_eq!(out, vec![Address::Network(cidr)]);
        }

        /// Stripping an already stripped body changes nothing
        #[test]
        fn prop_strip_comments_idempotent(content in list_content_strategy(60)) {
            let once = strip_comments(&content);
            let twice = strip_comments(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
