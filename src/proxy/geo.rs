//! Region filtering: static range table first, country lookup as fallback
//!
//! A candidate is in region when its address falls in any range of the
//! static table. Otherwise a [`CountryLookup`] backend resolves its country
//! code. Every lookup failure classifies the candidate as out of region.

use crate::error::Error;
use crate::proxy::models::{GeoDecision, ProxyCandidate};
use crate::proxy::region::RegionTable;
use crate::state::{CancelSignal, Interrupt};
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use maxminddb::{geoip2, Reader};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default timeout for a fallback lookup in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default number of concurrent fallback lookups
const DEFAULT_CONCURRENCY: usize = 10;

/// Default lookup endpoint, `{ip}` is replaced by the address
const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json/{ip}?fields=status,countryCode";

/// Configuration for the region filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Query a lookup backend when the static table has no match
    pub fallback: bool,
    /// Lookup URL template with an `{ip}` placeholder
    pub endpoint: String,
    /// Timeout for each lookup, in milliseconds
    pub timeout_ms: u64,
    /// Maximum concurrent lookups
    pub concurrency: usize,
    /// Offline MMDB database; replaces the HTTP endpoint when set
    pub mmdb_path: Option<PathBuf>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            fallback: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
            mmdb_path: None,
        }
    }
}

impl GeoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_mmdb_path(mut self, path: PathBuf) -> Self {
        self.mmdb_path = Some(path);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Resolves the ISO country code of an address
#[async_trait]
pub trait CountryLookup: Send + Sync {
    async fn country_code(&self, ip: Ipv4Addr) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

/// Country lookup over an ip-api style JSON endpoint
#[derive(Debug, Clone)]
pub struct IpApiLookup {
    client: Client,
    endpoint: String,
}

impl IpApiLookup {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl CountryLookup for IpApiLookup {
    async fn country_code(&self, ip: Ipv4Addr) -> Result<String> {
        let failed = |reason: String| Error::GeoLookupFailed {
            ip: ip.to_string(),
            reason,
        };

        let url = self.endpoint.replace("{ip}", &ip.to_string());
        let body: IpApiResponse = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| failed(e.to_string()))?
            .json()
            .await
            .map_err(|e| failed(e.to_string()))?;

        body.country_code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| failed("no country code in response".to_string()))
    }
}

/// Country lookup against a local MaxMind database
#[derive(Clone)]
pub struct MmdbLookup {
    reader: Arc<Reader<Vec<u8>>>,
}

impl MmdbLookup {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = Reader::open_readfile(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot open {}: {e}", path.display()))
        })?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }
}

#[async_trait]
impl CountryLookup for MmdbLookup {
    async fn country_code(&self, ip: Ipv4Addr) -> Result<String> {
        let failed = |reason: String| Error::GeoLookupFailed {
            ip: ip.to_string(),
            reason,
        };

        let lookup_result = self
            .reader
            .lookup(IpAddr::V4(ip))
            .map_err(|e| failed(e.to_string()))?;
        let country: Option<geoip2::Country> =
            lookup_result.decode().map_err(|e| failed(e.to_string()))?;

        country
            .and_then(|country| country.country.iso_code.map(String::from))
            .ok_or_else(|| failed("address not in database".to_string()))
    }
}

/// Classifies candidates as in or out of the target region
#[derive(Clone)]
pub struct GeoFilter {
    region: String,
    table: Arc<RegionTable>,
    lookup: Option<Arc<dyn CountryLookup>>,
    concurrency: usize,
}

impl GeoFilter {
    pub fn new(
        region: &str,
        table: Arc<RegionTable>,
        lookup: Option<Arc<dyn CountryLookup>>,
        concurrency: usize,
    ) -> Self {
        Self {
            region: region.to_uppercase(),
            table,
            lookup,
            concurrency: concurrency.max(1),
        }
    }

    /// Build a filter with the lookup backend selected by `config`
    pub fn from_config(config: &GeoConfig, region: &str, table: Arc<RegionTable>) -> Result<Self> {
        let lookup: Option<Arc<dyn CountryLookup>> = match (&config.mmdb_path, config.fallback) {
            (_, false) => None,
            (Some(path), true) => Some(Arc::new(MmdbLookup::from_path(path)?)),
            (None, true) => Some(Arc::new(IpApiLookup::new(
                &config.endpoint,
                config.timeout(),
            )?)),
        };
        Ok(Self::new(region, table, lookup, config.concurrency))
    }

    /// Same lookup backend and limits, different region and table
    pub fn for_region(&self, region: &str, table: Arc<RegionTable>) -> Self {
        Self::new(region, table, self.lookup.clone(), self.concurrency)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Classify a single candidate
    pub async fn classify(&self, candidate: ProxyCandidate) -> GeoDecision {
        let Some(ip) = candidate.ip() else {
            debug!(%candidate, "unparseable address, excluded");
            return GeoDecision::unresolved(candidate);
        };

        if self.table.contains(ip) {
            return GeoDecision::static_match(candidate);
        }

        let Some(lookup) = &self.lookup else {
            return GeoDecision::unresolved(candidate);
        };

        match lookup.country_code(ip).await {
            Ok(code) => {
                let in_region = code.eq_ignore_ascii_case(&self.region);
                GeoDecision::looked_up(candidate, in_region)
            }
            Err(e) => {
                debug!(%candidate, error = %e, "lookup failed, excluded");
                GeoDecision::unresolved(candidate)
            }
        }
    }

    /// Classify all candidates, running fallback lookups concurrently.
    ///
    /// Decisions come back in completion order. If `cancel` fires, decisions
    /// already made are returned together with the interrupt; lookups still in
    /// flight are dropped.
    pub async fn classify_all(
        &self,
        candidates: Vec<ProxyCandidate>,
        cancel: &CancelSignal,
    ) -> (Vec<GeoDecision>, Option<Interrupt>) {
        let mut decisions = Vec::with_capacity(candidates.len());

        let mut pending = stream::iter(candidates)
            .map(|candidate| self.classify(candidate))
            .buffer_unordered(self.concurrency);

        loop {
            tokio::select! {
                biased;
                interrupt = cancel.fired() => return (decisions, Some(interrupt)),
                next = pending.next() => match next {
                    Some(decision) => decisions.push(decision),
                    None => break,
                },
            }
        }

        (decisions, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLookup {
        code: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CountryLookup for FixedLookup {
        async fn country_code(&self, ip: Ipv4Addr) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.code.map(String::from).ok_or(Error::GeoLookupFailed {
                ip: ip.to_string(),
                reason: "stub".to_string(),
            })
        }
    }

    fn filter_with(code: Option<&'static str>) -> (GeoFilter, Arc<FixedLookup>) {
        let lookup = Arc::new(FixedLookup {
            code,
            calls: AtomicUsize::new(0),
        });
        let table = Arc::new(RegionTable::parse(&["1.2.0.0/16"]).unwrap());
        let filter = GeoFilter::new("ir", table, Some(lookup.clone() as Arc<dyn CountryLookup>), 4);
        (filter, lookup)
    }

    #[test]
    fn test_geo_config_builder() {
        let config = GeoConfig::new()
            .with_fallback(false)
            .with_endpoint("http://localhost/{ip}".to_string())
            .with_timeout(Duration::from_millis(250))
            .with_concurrency(3);
        assert!(!config.fallback);
        assert_eq!(config.endpoint, "http://localhost/{ip}");
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.concurrency, 3);
        assert!(config.mmdb_path.is_none());
    }

    #[tokio::test]
    async fn test_static_match_skips_lookup() {
        let (filter, lookup) = filter_with(Some("US"));
        let decision = filter.classify(ProxyCandidate::new("1.2.3.4", 80)).await;
        assert!(decision.in_region);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookup_match_is_case_insensitive() {
        let (filter, lookup) = filter_with(Some("Ir"));
        let decision = filter.classify(ProxyCandidate::new("8.8.8.8", 80)).await;
        assert!(decision.in_region);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_fail_closed() {
        let (filter, _) = filter_with(None);
        let decision = filter.classify(ProxyCandidate::new("8.8.8.8", 80)).await;
        assert!(!decision.in_region);
    }

    #[tokio::test]
    async fn test_unparseable_address_never_looked_up() {
        let (filter, lookup) = filter_with(Some("IR"));
        let decision = filter.classify(ProxyCandidate::new("999.1.1.1", 80)).await;
        assert!(!decision.in_region);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_fallback_excludes_unmatched() {
        let table = Arc::new(RegionTable::parse(&["1.2.0.0/16"]).unwrap());
        let filter = GeoFilter::new("IR", table, None, 1);
        let decision = filter.classify(ProxyCandidate::new("8.8.8.8", 80)).await;
        assert!(!decision.in_region);
    }

    #[tokio::test]
    async fn test_classify_all() {
        let (filter, lookup) = filter_with(Some("IR"));
        let candidates = vec![
            ProxyCandidate::new("1.2.3.4", 80),
            ProxyCandidate::new("8.8.8.8", 80),
            ProxyCandidate::new("999.0.0.1", 80),
        ];
        let (decisions, interrupt) = filter
            .classify_all(candidates, &CancelSignal::none())
            .await;
        assert!(interrupt.is_none());
        assert_eq!(decisions.len(), 3);
        assert_eq!(decisions.iter().filter(|d| d.in_region).count(), 2);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ip_api_lookup() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/json/5.6.7.8")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"success","countryCode":"IR"}"#)
            .create_async()
            .await;

        let endpoint = format!("{}/json/{{ip}}", server.url());
        let lookup = IpApiLookup::new(&endpoint, Duration::from_secs(2)).unwrap();
        let code = lookup.country_code(Ipv4Addr::new(5, 6, 7, 8)).await.unwrap();
        assert_eq!(code, "IR");
    }

    #[tokio::test]
    async fn test_ip_api_lookup_failures() {
        let mut server = mockito::Server::new_async().await;
        let _fail = server
            .mock("GET", "/json/10.0.0.1")
            .with_status(200)
            .with_body(r#"{"status":"fail","message":"private range"}"#)
            .create_async()
            .await;
        let _error = server
            .mock("GET", "/json/10.0.0.2")
            .with_status(500)
            .create_async()
            .await;
        let _garbage = server
            .mock("GET", "/json/10.0.0.3")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let endpoint = format!("{}/json/{{ip}}", server.url());
        let lookup = IpApiLookup::new(&endpoint, Duration::from_secs(2)).unwrap();
        for last in 1..=3 {
            let result = lookup.country_code(Ipv4Addr::new(10, 0, 0, last)).await;
            assert!(matches!(result, Err(Error::GeoLookupFailed { .. })));
        }
    }

    #[test]
    fn test_mmdb_missing_file() {
        assert!(MmdbLookup::from_path("/nonexistent/GeoLite2-Country.mmdb").is_err());

        let config =
            GeoConfig::new().with_mmdb_path(PathBuf::from("/nonexistent/GeoLite2-Country.mmdb"));
        let result = GeoFilter::from_config(&config, "IR", Arc::new(RegionTable::default()));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
