//! Proxy module for collecting and checking proxies
//!
//! This module provides functionality for:
//! - Crawling proxy list sources and extracting `ip:port` candidates
//! - Classifying candidates by region from a static table or a country lookup
//! - Checking proxy liveness and latency with bounded concurrency

pub mod checker;
pub mod crawler;
pub mod geo;
pub mod models;
pub mod parser;
pub mod region;

pub use checker::{CheckerConfig, HttpProbe, ProxyChecker, ProxyProbe};
pub use crawler::{CrawlResult, CrawlerConfig, ProxyCrawler, ProxySource};
pub use geo::{CountryLookup, GeoConfig, GeoFilter, IpApiLookup, MmdbLookup};
pub use models::{GeoBasis, GeoDecision, ProbeResult, ProbeStatus, ProxyCandidate, WorkingProxy};
pub use parser::ProxyParser;
pub use region::{RegionRange, RegionTable};
