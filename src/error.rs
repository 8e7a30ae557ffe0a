//! Error types for proxy-scout

use std::io;

/// Errors raised by the discovery pipeline.
///
/// Per-source and per-candidate variants never abort a run: the stage that
/// produces them logs the error and drops the item. Only configuration
/// problems and cancellation reach the caller of a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("source {source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("geolocation lookup failed for {ip}: {reason}")]
    GeoLookupFailed { ip: String, reason: String },

    #[error("probe timed out after {0}ms")]
    ProbeTimeout(u64),

    #[error("probe connection failed: {0}")]
    ProbeConnectionFailed(String),

    #[error("probe returned HTTP status {0}")]
    ProbeBadStatus(u16),

    #[error("missing configuration: {0}")]
    ConfigurationMissing(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for proxy-scout operations
pub type Result<T> = std::result::Result<T, Error>;
