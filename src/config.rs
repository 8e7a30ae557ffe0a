//! Process configuration, loaded once at startup

use crate::error::Error;
use crate::proxy::checker::CheckerConfig;
use crate::proxy::crawler::{CrawlerConfig, ProxyCrawler, ProxySource};
use crate::proxy::geo::GeoConfig;
use crate::proxy::region::{RegionTable, IRAN_RANGES};
use crate::report::ReportConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default target region code
const DEFAULT_REGION: &str = "IR";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ISO country code of the target region
    pub region: String,
    /// Abort network work after this many seconds; unlimited when unset
    pub run_timeout_secs: Option<u64>,
    /// CIDR blocks known to belong to `region`
    pub region_ranges: Vec<String>,
    /// Proxy list endpoints
    pub sources: Vec<ProxySource>,
    pub crawler: CrawlerConfig,
    pub geo: GeoConfig,
    pub checker: CheckerConfig,
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            run_timeout_secs: None,
            region_ranges: IRAN_RANGES.iter().map(|r| r.to_string()).collect(),
            sources: ProxyCrawler::get_common_sources(),
            crawler: CrawlerConfig::default(),
            geo: GeoConfig::default(),
            checker: CheckerConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file; missing keys take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        info!(
            path = %path.as_ref().display(),
            sources = config.sources.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Parse the configured range table
    pub fn region_table(&self) -> Result<RegionTable> {
        RegionTable::parse(&self.region_ranges)
    }

    /// Check that everything a run needs is present and sane
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::ConfigurationMissing(
                "no proxy sources configured".to_string(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(Error::ConfigurationMissing("target region".to_string()));
        }
        if !is_region_code(&self.region) {
            return Err(Error::InvalidConfig(format!(
                "region '{}' is not a two-letter country code",
                self.region
            )));
        }
        if self.checker.test_url.trim().is_empty() {
            return Err(Error::ConfigurationMissing("checker.test_url".to_string()));
        }
        if self.checker.concurrency == 0 || self.geo.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.crawler.timeout_ms == 0 || self.geo.timeout_ms == 0 || self.checker.timeout_ms == 0
        {
            return Err(Error::InvalidConfig(
                "timeouts must be at least 1ms".to_string(),
            ));
        }
        if self.report.chunk_limit == 0 {
            return Err(Error::InvalidConfig(
                "report.chunk_limit must be at least 1".to_string(),
            ));
        }
        if self.geo.fallback && self.geo.mmdb_path.is_none() && !self.geo.endpoint.contains("{ip}")
        {
            return Err(Error::InvalidConfig(
                "geo.endpoint needs an {ip} placeholder".to_string(),
            ));
        }
        self.region_table()?;
        Ok(())
    }
}

/// True for two ASCII letters
pub fn is_region_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.region, "IR");
        assert_eq!(config.sources.len(), 4);
        assert_eq!(config.region_table().unwrap().len(), IRAN_RANGES.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_sources() {
        let config = Config {
            sources: Vec::new(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let bad_region = Config {
            region: "IRN".to_string(),
            ..Config::default()
        };
        assert!(matches!(bad_region.validate(), Err(Error::InvalidConfig(_))));

        let bad_range = Config {
            region_ranges: vec!["1.2.3.0/40".to_string()],
            ..Config::default()
        };
        assert!(matches!(bad_range.validate(), Err(Error::InvalidConfig(_))));

        let mut zero = Config::default();
        zero.checker.concurrency = 0;
        assert!(matches!(zero.validate(), Err(Error::InvalidConfig(_))));

        let mut zero_probe_timeout = Config::default();
        zero_probe_timeout.checker.timeout_ms = 0;
        assert!(matches!(
            zero_probe_timeout.validate(),
            Err(Error::InvalidConfig(_))
        ));

        let mut zero_fetch_timeout = Config::default();
        zero_fetch_timeout.crawler.timeout_ms = 0;
        assert!(matches!(
            zero_fetch_timeout.validate(),
            Err(Error::InvalidConfig(_))
        ));

        let mut zero_lookup_timeout = Config::default();
        zero_lookup_timeout.geo.timeout_ms = 0;
        assert!(matches!(
            zero_lookup_timeout.validate(),
            Err(Error::InvalidConfig(_))
        ));

        let mut no_placeholder = Config::default();
        no_placeholder.geo.endpoint = "http://ip-api.com/json/".to_string();
        assert!(matches!(
            no_placeholder.validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_toml_takes_defaults() {
        let config: Config = toml::from_str(
            r#"
region = "TR"
run_timeout_secs = 120
region_ranges = ["5.0.0.0/8"]

[checker]
concurrency = 5

[[sources]]
name = "local"
url = "http://localhost/list.txt"
"#,
        )
        .unwrap();

        assert_eq!(config.region, "TR");
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.checker.concurrency, 5);
        assert_eq!(config.checker.test_url, CheckerConfig::default().test_url);
        assert_eq!(config.sources, vec![ProxySource::new("local", "http://localhost/list.txt")]);
        assert_eq!(config.report, ReportConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            Config::from_file("/nonexistent/proxy-scout.toml"),
            Err(Error::Io(_))
        ));
    }
}
