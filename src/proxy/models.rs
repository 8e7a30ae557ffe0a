//! Proxy data models

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// An `ip:port` pair extracted from a proxy list, not yet verified.
///
/// Both parts are kept exactly as they appeared in the source text. Octets
/// above 255 or ports above 65535 are not rejected here; [`ip`](Self::ip)
/// and [`socket_addr`](Self::socket_addr) return `None` for them so later
/// stages can treat the candidate as not usable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub host: String,
    pub port: u32,
}

impl ProxyCandidate {
    pub fn new(host: impl Into<String>, port: u32) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parsed IPv4 address, if the host text is a valid one
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.host.parse().ok()
    }

    /// Parsed socket address, if both host and port are in range
    pub fn socket_addr(&self) -> Option<SocketAddrV4> {
        let port = u16::try_from(self.port).ok()?;
        Some(SocketAddrV4::new(self.ip()?, port))
    }

    /// Proxy URL used when routing a request through this candidate
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How a region decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoBasis {
    /// Matched an entry of the static range table
    StaticRange,
    /// Resolved through the fallback lookup
    Lookup,
    /// The lookup failed or was unavailable
    Unresolved,
}

/// Region membership decision for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoDecision {
    pub candidate: ProxyCandidate,
    pub in_region: bool,
    pub basis: GeoBasis,
}

impl GeoDecision {
    pub fn static_match(candidate: ProxyCandidate) -> Self {
        Self {
            candidate,
            in_region: true,
            basis: GeoBasis::StaticRange,
        }
    }

    pub fn looked_up(candidate: ProxyCandidate, in_region: bool) -> Self {
        Self {
            candidate,
            in_region,
            basis: GeoBasis::Lookup,
        }
    }

    pub fn unresolved(candidate: ProxyCandidate) -> Self {
        Self {
            candidate,
            in_region: false,
            basis: GeoBasis::Unresolved,
        }
    }
}

/// Outcome of a single liveness probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeStatus {
    Reachable,
    Timeout,
    ConnectionFailed(String),
    BadStatus(u16),
    /// Host or port could not be parsed; no request was sent
    Invalid,
}

/// Result of probing one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub candidate: ProxyCandidate,
    pub status: ProbeStatus,
    pub latency_ms: Option<f64>,
}

impl ProbeResult {
    pub fn reachable(candidate: ProxyCandidate, latency_ms: f64) -> Self {
        Self {
            candidate,
            status: ProbeStatus::Reachable,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn failed(candidate: ProxyCandidate, status: ProbeStatus) -> Self {
        Self {
            candidate,
            status,
            latency_ms: None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self.status, ProbeStatus::Reachable)
    }

    /// Convert into a working proxy if the probe succeeded
    pub fn into_working(self) -> Option<WorkingProxy> {
        match (self.status, self.latency_ms) {
            (ProbeStatus::Reachable, Some(latency_ms)) => Some(WorkingProxy {
                candidate: self.candidate,
                latency_ms,
            }),
            _ => None,
        }
    }
}

/// A candidate that passed region filtering and the liveness probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingProxy {
    pub candidate: ProxyCandidate,
    pub latency_ms: f64,
}

impl WorkingProxy {
    pub fn new(candidate: ProxyCandidate, latency_ms: f64) -> Self {
        Self {
            candidate,
            latency_ms,
        }
    }

    /// Report ordering: latency ascending, then `(host, port)`
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.latency_ms
            .total_cmp(&other.latency_ms)
            .then_with(|| self.candidate.cmp(&other.candidate))
    }
}
