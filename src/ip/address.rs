//! Address-space arithmetic.
//!
//! Maps between host offsets (what freelists hand out) and concrete
//! addresses for a network given as base address plus prefix length.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Offsets below this one (network address, gateway) are never allocated
pub const FIRST_HOST_OFFSET: u64 = 2;

/// Offsets reserved at the top of every space (final slot and broadcast)
pub const RESERVED_TOP_OFFSETS: u128 = 2;

/// Longest IPv4 prefix that still leaves room for one host
const MAX_V4_PREFIX: u8 = 30;

/// IPv6 offsets are stored in 64 bits
const MIN_V6_PREFIX: u8 = 64;
const MAX_V6_PREFIX: u8 = 126;

/// Address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Family {
    #[serde(rename = "4")]
    V4,
    #[serde(rename = "6")]
    V6,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::V4, Family::V6];

    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "4"),
            Family::V6 => write!(f, "6"),
        }
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches(['v', 'V']) {
            "4" => Ok(Family::V4),
            "6" => Ok(Family::V6),
            other => Err(Error::InvalidArgument(format!(
                "unknown address family '{}' (expected 4 or 6)",
                other
            ))),
        }
    }
}

/// A validated network address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    base: IpAddr,
    prefix: u8,
}

/// Address as an integer together with the width of its family
fn to_bits(ip: IpAddr) -> (u128, u8) {
    match ip {
        IpAddr::V4(addr) => (u128::from(u32::from(addr)), 32),
        IpAddr::V6(addr) => (u128::from(addr), 128),
    }
}

/// Inverse of [`to_bits`]; `value` must fit the family's width
fn from_bits(value: u128, family: Family) -> IpAddr {
    match family {
        Family::V4 => IpAddr::V4(Ipv4Addr::from(value as u32)),
        Family::V6 => IpAddr::V6(Ipv6Addr::from(value)),
    }
}

/// Mask with the top `prefix` bits of a `width`-bit address set
fn mask_bits(prefix: u8, width: u8) -> u128 {
    let host_bits = u32::from(width - prefix);
    let all = if width == 128 { u128::MAX } else { (1u128 << width) - 1 };
    if host_bits >= 128 {
        0
    } else {
        all & !((1u128 << host_bits) - 1)
    }
}

impl AddressSpace {
    /// Parse a CIDR string such as `10.50.0.0/16`. Host bits are truncated.
    pub fn parse(cidr: &str) -> Result<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| Error::InvalidNetwork(format!("'{}': missing prefix length", cidr)))?;
        let base: IpAddr = addr
            .parse()
            .map_err(|e| Error::InvalidNetwork(format!("'{}': {}", cidr, e)))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e| Error::InvalidNetwork(format!("'{}': {}", cidr, e)))?;
        Self::from_parts(base, prefix)
    }

    pub fn from_parts(base: IpAddr, prefix: u8) -> Result<Self> {
        let (bits, width) = to_bits(base);
        if prefix > width {
            return Err(Error::InvalidNetwork(format!(
                "{}/{}: prefix longer than the address",
                base, prefix
            )));
        }
        match Family::of(&base) {
            Family::V4 if prefix > MAX_V4_PREFIX => {
                return Err(Error::InvalidNetwork(format!(
                    "{}/{} leaves no room for hosts (longest usable prefix is /{})",
                    base, prefix, MAX_V4_PREFIX
                )))
            }
            Family::V6 if !(MIN_V6_PREFIX..=MAX_V6_PREFIX).contains(&prefix) => {
                return Err(Error::InvalidNetwork(format!(
                    "{}/{}: IPv6 prefix must be between /{} and /{}",
                    base, prefix, MIN_V6_PREFIX, MAX_V6_PREFIX
                )))
            }
            _ => {}
        }

        let base = from_bits(bits & mask_bits(prefix, width), Family::of(&base));
        Ok(AddressSpace { base, prefix })
    }

    pub fn family(&self) -> Family {
        Family::of(&self.base)
    }

    pub fn base(&self) -> IpAddr {
        self.base
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn netmask(&self) -> IpAddr {
        let (_, width) = to_bits(self.base);
        from_bits(mask_bits(self.prefix, width), self.family())
    }

    /// Number of addresses in the space
    pub fn size(&self) -> u128 {
        let (_, width) = to_bits(self.base);
        1u128 << (width - self.prefix)
    }

    /// First and last offsets handed out by the allocator.
    ///
    /// A /30 only has room for `[2, 2]` once the top two offsets are taken out.
    pub fn host_window(&self) -> (u64, u64) {
        let top = self.size() - 1 - RESERVED_TOP_OFFSETS;
        let last = u64::try_from(top).unwrap_or(u64::MAX).max(FIRST_HOST_OFFSET);
        (FIRST_HOST_OFFSET, last)
    }

    pub fn in_host_window(&self, offset: u64) -> bool {
        let (first, last) = self.host_window();
        first <= offset && offset <= last
    }

    /// Concrete address for a host offset
    pub fn address_of(&self, offset: u64) -> Result<IpAddr> {
        if u128::from(offset) >= self.size() {
            return Err(Error::InvalidArgument(format!(
                "offset {} is outside {}",
                offset, self
            )));
        }
        let (base, _) = to_bits(self.base);
        Ok(from_bits(base + u128::from(offset), self.family()))
    }

    /// Host offset of an address inside the space
    pub fn offset_of(&self, ip: IpAddr) -> Result<u64> {
        let outside = || Error::InvalidArgument(format!("{} is not in {}", ip, self));
        if Family::of(&ip) != self.family() {
            return Err(outside());
        }
        let (base, width) = to_bits(self.base);
        let (addr, _) = to_bits(ip);
        if addr & mask_bits(self.prefix, width) != base {
            return Err(outside());
        }
        u64::try_from(addr - base).map_err(|_| Error::InvalidArgument(format!("{} is out of range", ip)))
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_window_and_size() {
        let space = AddressSpace::parse("10.50.0.0/16").unwrap();
        assert_eq!(space.family(), Family::V4);
        assert_eq!(space.size(), 65536);
        assert_eq!(space.host_window(), (2, 65533));
        assert_eq!(space.netmask().to_string(), "255.255.0.0");
    }

    #[test]
    fn test_slash_30_collapses_to_one_host() {
        let space = AddressSpace::parse("10.51.0.0/30").unwrap();
        assert_eq!(space.size(), 4);
        assert_eq!(space.host_window(), (2, 2));
        assert_eq!(space.address_of(2).unwrap().to_string(), "10.51.0.2");
    }

    #[test]
    fn test_rejects_tiny_and_wide_networks() {
        assert!(AddressSpace::parse("10.0.0.0/31").is_err());
        assert!(AddressSpace::parse("10.0.0.0/32").is_err());
        assert!(AddressSpace::parse("fd00::/48").is_err());
        assert!(AddressSpace::parse("not-a-network").is_err());
        assert!(AddressSpace::parse("10.0.0.0").is_err());
        assert!(AddressSpace::parse("10.0.0.0/33").is_err());
    }

    #[test]
    fn test_host_bits_are_truncated() {
        let space = AddressSpace::parse("10.50.3.7/16").unwrap();
        assert_eq!(space.base().to_string(), "10.50.0.0");
    }

    #[test]
    fn test_offset_address_mapping() {
        let space = AddressSpace::parse("10.50.0.0/16").unwrap();
        let ip = space.address_of(258).unwrap();
        assert_eq!(ip.to_string(), "10.50.1.2");
        assert_eq!(space.offset_of(ip).unwrap(), 258);
        assert!(space.offset_of("10.51.0.1".parse().unwrap()).is_err());
        assert!(space.address_of(65536).is_err());
    }

    #[test]
    fn test_v6_space() {
        let space = AddressSpace::parse("fd00:1::/64").unwrap();
        assert_eq!(space.family(), Family::V6);
        assert_eq!(space.host_window(), (2, u64::MAX - 2));
        assert_eq!(space.address_of(2).unwrap().to_string(), "fd00:1::2");
        assert_eq!(space.netmask().to_string(), "ffff:ffff:ffff:ffff::");
    }

    #[test]
    fn test_family_from_str() {
        assert_eq!("4".parse::<Family>().unwrap(), Family::V4);
        assert_eq!("v6".parse::<Family>().unwrap(), Family::V6);
        assert!("5".parse::<Family>().is_err());
    }
}
