//! The managed address pool.
//!
//! Built once at startup from a list of addresses and prefixes, then
//! treated as read-only for the lifetime of the process.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

/// Largest number of host bits a single prefix may expand (65 536 addresses).
pub const MAX_HOST_BITS: u32 = 16;

/// Errors raised while building an [`AddressPool`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("prefix {prefix} spans 2^{host_bits} addresses, limit is 2^16")]
    PrefixTooLarge { prefix: String, host_bits: u32 },
}

/// Sorted, deduplicated set of virtual addresses under management.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressPool {
    addresses: Vec<IpAddr>,
}

impl AddressPool {
    /// Build a pool from explicit addresses.
    pub fn from_addresses(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        let set: BTreeSet<IpAddr> = addresses.into_iter().collect();
        Self {
            addresses: set.into_iter().collect(),
        }
    }

    /// Parse a comma and/or whitespace separated list of addresses and
    /// prefixes, e.g. `"10.0.0.1, 10.0.1.0/30"`.
    pub fn parse(input: &str) -> Result<Self, PoolError> {
        Self::parse_entries(input.split(|c: char| c == ',' || c.is_whitespace()))
    }

    /// Parse individual address or prefix entries. Blank entries are ignored.
    pub fn parse_entries<'a>(
        entries: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, PoolError> {
        let mut set = BTreeSet::new();
        for entry in entries {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if entry.contains('/') {
                set.extend(expand_prefix(entry)?);
            } else {
                let addr: IpAddr = entry
                    .parse()
                    .map_err(|_| PoolError::InvalidAddress(entry.to_string()))?;
                set.insert(addr);
            }
        }
        Ok(Self {
            addresses: set.into_iter().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.addresses.binary_search(addr).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.addresses.iter()
    }

    pub fn as_slice(&self) -> &[IpAddr] {
        &self.addresses
    }
}

impl FromStr for AddressPool {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Expand `a.b.c.d/n` (or an IPv6 prefix) into every address it covers,
/// network and broadcast addresses included.
pub fn expand_prefix(prefix: &str) -> Result<Vec<IpAddr>, PoolError> {
    let invalid = || PoolError::InvalidPrefix(prefix.to_string());

    let (addr, len) = prefix.trim().split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let len: u32 = len.parse().map_err(|_| invalid())?;

    let width = if addr.is_ipv4() { 32 } else { 128 };
    if len > width {
        return Err(invalid());
    }
    let host_bits = width - len;
    if host_bits > MAX_HOST_BITS {
        return Err(PoolError::PrefixTooLarge {
            prefix: prefix.trim().to_string(),
            host_bits,
        });
    }
    let size = 1u32 << host_bits;

    let addrs = match addr {
        IpAddr::V4(v4) => {
            let base = u32::from(v4) & (u32::MAX << host_bits);
            (0..size)
                .map(|i| IpAddr::V4(Ipv4Addr::from(base | i)))
                .collect()
        }
        IpAddr::V6(v6) => {
            let base = u128::from(v6) & (u128::MAX << host_bits);
            (0..size)
                .map(|i| IpAddr::V6(Ipv6Addr::from(base | u128::from(i))))
                .collect()
        }
    };
    Ok(addrs)
}
