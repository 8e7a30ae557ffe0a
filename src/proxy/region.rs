//! Static CIDR table used to classify addresses without a lookup

use crate::error::Error;
use crate::Result;
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Address blocks assigned to Iran, used as the built-in table for `IR`
pub const IRAN_RANGES: &[&str] = &[
    "2.176.0.0/12",
    "5.22.0.0/16",
    "5.23.0.0/16",
    "5.56.0.0/14",
    "37.156.0.0/14",
    "37.191.0.0/16",
    "46.209.0.0/16",
    "62.193.0.0/16",
    "78.157.0.0/16",
    "79.175.0.0/16",
    "80.191.0.0/16",
    "85.15.0.0/16",
    "87.107.0.0/16",
    "88.135.0.0/16",
    "89.165.0.0/16",
    "91.98.0.0/15",
    "92.114.0.0/15",
    "93.86.0.0/15",
    "94.182.0.0/15",
    "151.232.0.0/14",
    "176.65.192.0/18",
    "178.22.0.0/15",
    "178.131.0.0/16",
    "178.252.0.0/14",
    "185.4.16.0/22",
    "185.8.172.0/22",
    "185.10.68.0/22",
    "185.55.224.0/22",
];

/// An IPv4 CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionRange {
    net: Ipv4Net,
}

impl RegionRange {
    /// Create a range, masking off host bits of `network`
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        let net = Ipv4Net::new(network, prefix_len)
            .map_err(|e| Error::InvalidConfig(format!("{network}/{prefix_len}: {e}")))?;
        Ok(Self { net: net.trunc() })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.net.network()
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.net.contains(&ip)
    }
}

impl FromStr for RegionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let net: Ipv4Net = s
            .trim()
            .parse()
            .map_err(|e| Error::InvalidConfig(format!("invalid CIDR block '{s}': {e}")))?;
        Ok(Self { net: net.trunc() })
    }
}

impl fmt::Display for RegionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.net, f)
    }
}

/// Read-only set of ranges for one target region
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionTable {
    ranges: Vec<RegionRange>,
}

impl RegionTable {
    pub fn new(ranges: Vec<RegionRange>) -> Self {
        Self { ranges }
    }

    /// Parse a table from CIDR strings, failing on the first bad entry
    pub fn parse<S: AsRef<str>>(blocks: &[S]) -> Result<Self> {
        let ranges = blocks
            .iter()
            .map(|block| block.as_ref().parse())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ranges })
    }

    /// True when any range covers `ip`; overlapping ranges are fine
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }

    pub fn ranges(&self) -> &[RegionRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
