//! IPv4 address and CIDR block parsing.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::trie::KEY_BITS;

/// Parse a dotted-quad address into its big-endian `u32` form.
///
/// Octets are plain decimal and may carry leading zeros, so `010.000.000.001`
/// is `10.0.0.1`.
pub fn parse_address(text: &str) -> Result<u32> {
    let invalid = || Error::InvalidAddress(text.to_string());
    let mut octets = [0u8; 4];
    let mut parts = text.trim().split('.');
    for octet in &mut octets {
        let part = parts.next().ok_or_else(invalid)?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *octet = part.parse().map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(u32::from_be_bytes(octets))
}

/// An IPv4 CIDR block such as `10.0.0.0/8`.
///
/// The address is kept exactly as written; host bits beyond the prefix are
/// ignored by the trie, and [`Ipv4Cidr::network`] clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    /// Start address, most significant octet first.
    pub address: u32,
    /// Prefix length, `0..=32`.
    pub prefix_len: u8,
}

impl Ipv4Cidr {
    /// Create a block, validating the prefix length.
    pub fn new(address: u32, prefix_len: u8) -> Result<Self> {
        if prefix_len > KEY_BITS {
            return Err(Error::InvalidPrefixLength(i64::from(prefix_len)));
        }
        Ok(Self {
            address,
            prefix_len,
        })
    }

    /// Mask selecting the prefix bits.
    pub fn mask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            n => u32::MAX << (KEY_BITS - n),
        }
    }

    /// The address with all host bits cleared.
    pub fn network(&self) -> u32 {
        self.address & self.mask()
    }

    /// Check if `address` falls inside this block.
    pub fn contains(&self, address: u32) -> bool {
        address & self.mask() == self.network()
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        let (addr, len) = text
            .split_once('/')
            .ok_or_else(|| Error::InvalidAddress(text.to_string()))?;
        let address = parse_address(addr)?;
        let prefix_len = len
            .trim()
            .parse::<u8>()
            .map_err(|_| Error::InvalidAddress(text.to_string()))?;
        Self::new(address, prefix_len)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.address), self.prefix_len)
    }
}
