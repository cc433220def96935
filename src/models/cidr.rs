//! IPv4 CIDR notation.
//!
//! Provides [`Cidr`] for the overlay subnets handed to this crate, along with
//! the mask helpers used to validate them.

use crate::error::{Error, Result};
use serde::de;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Maximum length for an IPv4 prefix (32 bits).
pub const MAX_LENGTH: u8 = 32;

/// Convert a CIDR prefix length to a subnet mask as u32.
///
/// # Examples
/// ```
/// use gce_subnet_routes::models::get_cidr_mask;
/// assert_eq!(get_cidr_mask(24), Some(0xFFFFFF00));
/// ```
pub fn get_cidr_mask(len: u8) -> Option<u32> {
    if len > MAX_LENGTH {
        None
    } else {
        let right_len = MAX_LENGTH - len;
        let all_bits = u32::MAX as u64;
        Some(((all_bits >> right_len) << right_len) as u32)
    }
}

/// IPv4 subnet, e.g. `10.1.2.0/24`.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Copy, Clone, Hash)]
pub struct Cidr {
    /// The base address as written.
    pub addr: Ipv4Addr,
    /// The prefix length (0-32).
    pub prefix: u8,
}

impl Cidr {
    /// Parse a CIDR string such as `"10.1.2.0/24"`.
    pub fn new(addr_cidr: &str) -> Result<Cidr> {
        let invalid = |reason: &str| Error::InvalidCidr {
            input: addr_cidr.to_string(),
            reason: reason.to_string(),
        };
        let (addr, prefix) = addr_cidr
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected address/prefix"))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| invalid(&format!("invalid address {addr}")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| invalid(&format!("invalid prefix length {prefix}")))?;
        if prefix > MAX_LENGTH {
            return Err(invalid("prefix length is too long"));
        }
        Ok(Cidr { addr, prefix })
    }

    /// The subnet mask as u32.
    pub fn mask(&self) -> u32 {
        get_cidr_mask(self.prefix).unwrap_or(u32::MAX)
    }

    /// The network address (host bits cleared).
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.mask())
    }

    /// True when the address carries no host bits, as the provider requires
    /// for route destinations and IP ranges.
    pub fn is_network_aligned(&self) -> bool {
        self.network() == self.addr
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask() == u32::from(self.network())
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Cidr> {
        Cidr::new(s)
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl Serialize for Cidr {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Cidr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Cidr::new(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cidr_mask() {
        assert_eq!(get_cidr_mask(0), Some(0x00000000));
        assert_eq!(get_cidr_mask(8), Some(0xFF000000));
        assert_eq!(get_cidr_mask(16), Some(0xFFFF0000));
        assert_eq!(get_cidr_mask(24), Some(0xFFFFFF00));
        assert_eq!(get_cidr_mask(32), Some(0xFFFFFFFF));
        assert_eq!(get_cidr_mask(33), None);
    }

    #[test]
    fn test_parse_and_display() {
        let cidr = Cidr::new("10.1.2.0/24").unwrap();
        assert_eq!(cidr.addr, Ipv4Addr::new(10, 1, 2, 0));
        assert_eq!(cidr.prefix, 24);
        assert_eq!(cidr.to_string(), "10.1.2.0/24");
        assert_eq!(" 10.1.2.0/24 ".parse::<Cidr>().unwrap(), cidr);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Cidr::new("10.1.2.0").is_err());
        assert!(Cidr::new("10.1.2/24").is_err());
        assert!(Cidr::new("10.1.2.0/33").is_err());
        assert!(Cidr::new("10.1.2.0/x").is_err());
        assert!(Cidr::new("fd00::/64").is_err());
        let err = Cidr::new("10.1.2.0/40").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid CIDR \"10.1.2.0/40\": prefix length is too long"
        );
    }

    #[test]
    fn test_network_alignment() {
        let aligned = Cidr::new("10.244.3.0/24").unwrap();
        assert!(aligned.is_network_aligned());
        let host_bits = Cidr::new("10.244.3.7/24").unwrap();
        assert!(!host_bits.is_network_aligned());
        assert_eq!(host_bits.network(), Ipv4Addr::new(10, 244, 3, 0));
        assert!(host_bits.contains(Ipv4Addr::new(10, 244, 3, 200)));
        assert!(!host_bits.contains(Ipv4Addr::new(10, 244, 4, 1)));
    }

    #[test]
    fn test_serde_as_string() {
        let cidr: Cidr = serde_json::from_str("\"192.168.0.0/16\"").unwrap();
        assert_eq!(cidr, Cidr::new("192.168.0.0/16").unwrap());
        assert_eq!(serde_json::to_string(&cidr).unwrap(), "\"192.168.0.0/16\"");
        assert!(serde_json::from_str::<Cidr>("\"192.168.0.0\"").is_err());
    }
}
