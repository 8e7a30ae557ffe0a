//! Proxy crawler module for fetching proxy lists from configured sources
//!
//! Each source is fetched once per run with a bounded timeout. A failed
//! source contributes nothing; it never aborts the crawl.

use crate::error::Error;
use crate::proxy::models::ProxyCandidate;
use crate::proxy::parser::ProxyParser;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for HTTP requests in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Result of crawling a single source
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// The source that was crawled
    pub source: String,
    /// Candidates extracted from the source
    pub proxies: Vec<ProxyCandidate>,
    /// Error message if crawling failed
    pub error: Option<String>,
}

impl CrawlResult {
    pub fn success(source: String, proxies: Vec<ProxyCandidate>) -> Self {
        Self {
            source,
            proxies,
            error: None,
        }
    }

    pub fn failure(source: String, error: String) -> Self {
        Self {
            source,
            proxies: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration for proxy crawler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Timeout for each source request, in milliseconds
    pub timeout_ms: u64,
    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A list-producing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySource {
    /// Name of the proxy source
    pub name: String,
    /// URL to fetch proxies from
    pub url: String,
}

impl ProxySource {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    /// Build a source named after its URL host
    pub fn from_url(url: &str) -> Self {
        let name = reqwest::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        Self {
            name,
            url: url.to_string(),
        }
    }
}

/// Proxy crawler for fetching candidate lists from sources
#[derive(Debug, Clone)]
pub struct ProxyCrawler {
    config: CrawlerConfig,
    client: Client,
}

impl ProxyCrawler {
    pub fn new() -> Result<Self> {
        Self::with_config(CrawlerConfig::default())
    }

    pub fn with_config(config: CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Fetch the raw body of a source. Non-2xx responses are errors.
    pub async fn fetch(&self, source: &ProxySource) -> Result<String> {
        let unavailable = |e: reqwest::Error| Error::SourceUnavailable {
            source_name: source.name.clone(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;

        response.text().await.map_err(unavailable)
    }

    /// Fetch a source and extract its candidates, converting failures into
    /// an empty result
    pub async fn crawl_source(&self, source: &ProxySource) -> CrawlResult {
        match self.fetch(source).await {
            Ok(content) => {
                let proxies = ProxyParser::extract(&content);
                debug!(source = %source.name, found = proxies.len(), "source crawled");
                CrawlResult::success(source.name.clone(), proxies)
            }
            Err(e) => {
                warn!(source = %source.name, error = %e, "skipping source");
                CrawlResult::failure(source.name.clone(), e.to_string())
            }
        }
    }

    /// Built-in public HTTP proxy lists
    pub fn get_common_sources() -> Vec<ProxySource> {
        vec![
            ProxySource::new(
                "proxy-list.download",
                "https://www.proxy-list.download/api/v1/get?type=http&country=IR",
            ),
            ProxySource::new(
                "TheSpeedX",
                "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
            ),
            ProxySource::new(
                "clarketm",
                "https://raw.githubusercontent.com/clarketm/proxy-list/master/proxy-list-raw.txt",
            ),
            ProxySource::new(
                "ShiftyTR",
                "https://raw.githubusercontent.com/ShiftyTR/Proxy-List/master/proxy.txt",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawler_config_default() {
        let config = CrawlerConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_crawler_config_builder() {
        let config = CrawlerConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("Custom Agent".to_string());

        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.user_agent, "Custom Agent");
    }

    #[test]
    fn test_proxy_source_from_url() {
        let source = ProxySource::from_url("https://example.com/proxies.txt");
        assert_eq!(source.name, "example.com");
        assert_eq!(source.url, "https://example.com/proxies.txt");

        let odd = ProxySource::from_url("not a url");
        assert_eq!(odd.name, "not a url");
    }

    #[test]
    fn test_crawl_result_failure() {
        let result =
            CrawlResult::failure("test-source".to_string(), "Connection failed".to_string());
        assert!(!result.is_success());
        assert!(result.proxies.is_empty());
        assert_eq!(result.error, Some("Connection failed".to_string()));
    }

    #[test]
    fn test_get_common_sources() {
        let sources = ProxyCrawler::get_common_sources();
        assert_eq!(sources.len(), 4);
        for source in &sources {
            assert!(!source.name.is_empty());
            assert!(source.url.starts_with("https://"));
        }
    }

    #[tokio::test]
    async fn test_crawl_source_extracts_candidates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/list.txt")
            .with_status(200)
            .with_body("1.2.3.4:8080\ngarbage\n5.6.7.8:3128\n")
            .create_async()
            .await;

        let crawler = ProxyCrawler::new().unwrap();
        let source = ProxySource::new("mock", &format!("{}/list.txt", server.url()));
        let result = crawler.crawl_source(&source).await;

        mock.assert_async().await;
        assert!(result.is_success());
        assert_eq!(
            result.proxies,
            vec![
                ProxyCandidate::new("1.2.3.4", 8080),
                ProxyCandidate::new("5.6.7.8", 3128),
            ]
        );
    }

    #[tokio::test]
    async fn test_crawl_source_non_success_status_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/down")
            .with_status(503)
            .with_body("1.2.3.4:8080")
            .create_async()
            .await;

        let crawler = ProxyCrawler::new().unwrap();
        let source = ProxySource::new("down", &format!("{}/down", server.url()));
        let result = crawler.crawl_source(&source).await;

        assert!(!result.is_success());
        assert!(result.proxies.is_empty());
    }

    #[tokio::test]
    async fn test_crawl_source_connection_error_is_empty() {
        let crawler = ProxyCrawler::with_config(
            CrawlerConfig::new().with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let source = ProxySource::new("closed", "http://127.0.0.1:9/list");
        let result = crawler.crawl_source(&source).await;
        assert!(!result.is_success());
        assert!(result.proxies.is_empty());
    }
}
