//! Liveness probing of candidates through themselves as HTTP proxies

use crate::error::Error;
use crate::proxy::models::{ProbeResult, ProbeStatus, ProxyCandidate};
use crate::sink::{ProgressEvent, RunSink};
use crate::state::{CancelSignal, Interrupt};
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Proxy as ReqwestProxy, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default timeout for proxy checks in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default number of concurrent checks
const DEFAULT_CONCURRENCY: usize = 20;

/// Default URL to test proxies against
const DEFAULT_TEST_URL: &str = "http://httpbin.org/ip";

/// Default number of completed probes between progress updates
const DEFAULT_PROGRESS_EVERY: usize = 5;

/// Configuration for proxy checker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Timeout for each proxy check, in milliseconds
    pub timeout_ms: u64,
    /// Number of concurrent checks
    pub concurrency: usize,
    /// URL to test proxies against
    pub test_url: String,
    /// Emit a progress update after this many completed checks
    pub progress_every: usize,
    /// Probe at most this many candidates; all when unset
    pub probe_limit: Option<usize>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
            test_url: DEFAULT_TEST_URL.to_string(),
            progress_every: DEFAULT_PROGRESS_EVERY,
            probe_limit: None,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every;
        self
    }

    pub fn with_probe_limit(mut self, limit: usize) -> Self {
        self.probe_limit = Some(limit);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ProbeStatus {
    /// Error describing a failed probe, `None` when reachable
    pub fn error(&self, timeout: Duration) -> Option<Error> {
        match self {
            ProbeStatus::Reachable => None,
            ProbeStatus::Timeout => Some(Error::ProbeTimeout(timeout.as_millis() as u64)),
            ProbeStatus::ConnectionFailed(reason) => {
                Some(Error::ProbeConnectionFailed(reason.clone()))
            }
            ProbeStatus::BadStatus(code) => Some(Error::ProbeBadStatus(*code)),
            ProbeStatus::Invalid => Some(Error::ProbeConnectionFailed(
                "invalid proxy address".to_string(),
            )),
        }
    }
}

/// A single reachability check through a candidate
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn probe(&self, candidate: &ProxyCandidate) -> ProbeResult;
}

/// Probe that fetches an echo URL through the candidate as an HTTP proxy
#[derive(Debug, Clone)]
pub struct HttpProbe {
    test_url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(test_url: &str, timeout: Duration) -> Self {
        Self {
            test_url: test_url.to_string(),
            timeout,
        }
    }

    /// Create a reqwest client routed through the candidate
    fn create_client(&self, candidate: &ProxyCandidate) -> Result<Client> {
        let proxy = ReqwestProxy::all(candidate.url())?;

        let client = Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .build()?;

        Ok(client)
    }
}

#[async_trait]
impl ProxyProbe for HttpProbe {
    async fn probe(&self, candidate: &ProxyCandidate) -> ProbeResult {
        if candidate.socket_addr().is_none() {
            return ProbeResult::failed(candidate.clone(), ProbeStatus::Invalid);
        }

        let client = match self.create_client(candidate) {
            Ok(client) => client,
            Err(e) => {
                return ProbeResult::failed(
                    candidate.clone(),
                    ProbeStatus::ConnectionFailed(e.to_string()),
                )
            }
        };

        let start = Instant::now();
        let request = async {
            let response = client.get(&self.test_url).send().await?;
            let status = response.status();
            response.bytes().await?;
            Ok::<_, reqwest::Error>(status)
        };

        let status = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(status)) if status == StatusCode::OK => {
                let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                let latency_ms = (elapsed * 100.0).round() / 100.0;
                return ProbeResult::reachable(candidate.clone(), latency_ms);
            }
            Ok(Ok(status)) => ProbeStatus::BadStatus(status.as_u16()),
            Ok(Err(e)) if e.is_timeout() => ProbeStatus::Timeout,
            Ok(Err(e)) => ProbeStatus::ConnectionFailed(e.to_string()),
            Err(_) => ProbeStatus::Timeout,
        };

        ProbeResult::failed(candidate.clone(), status)
    }
}

/// Proxy checker for validating candidates concurrently
#[derive(Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
    probe: Arc<dyn ProxyProbe>,
}

impl ProxyChecker {
    /// Create a checker probing over HTTP
    pub fn new(config: CheckerConfig) -> Self {
        let probe = Arc::new(HttpProbe::new(&config.test_url, config.timeout()));
        Self::with_probe(config, probe)
    }

    /// Create a checker with a custom probe implementation
    pub fn with_probe(config: CheckerConfig, probe: Arc<dyn ProxyProbe>) -> Self {
        Self { config, probe }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Check a single candidate
    pub async fn check_proxy(&self, candidate: &ProxyCandidate) -> ProbeResult {
        let result = self.probe.probe(candidate).await;
        if let Some(e) = result.status.error(self.config.timeout()) {
            debug!(%candidate, error = %e, "probe failed");
        }
        result
    }

    /// Check candidates concurrently, reporting progress to `sink`.
    ///
    /// At most `concurrency` probes run at once. When `cancel` fires, the
    /// results already collected are returned with the interrupt and probes
    /// still in flight are dropped.
    pub async fn check_proxies(
        &self,
        mut candidates: Vec<ProxyCandidate>,
        cancel: &CancelSignal,
        sink: &dyn RunSink,
    ) -> (Vec<ProbeResult>, Option<Interrupt>) {
        if let Some(limit) = self.config.probe_limit {
            candidates.truncate(limit);
        }

        let total = candidates.len();
        let concurrency = self.config.concurrency.max(1);
        let every = self.config.progress_every.max(1);

        let mut pending = stream::iter(candidates)
            .map(|candidate| async move { self.check_proxy(&candidate).await })
            .buffer_unordered(concurrency);

        let mut results = Vec::with_capacity(total);
        let mut healthy = 0;
        let mut interrupt = None;

        loop {
            tokio::select! {
                biased;
                fired = cancel.fired() => {
                    interrupt = Some(fired);
                    break;
                }
                next = pending.next() => match next {
                    Some(result) => {
                        if result.is_reachable() {
                            healthy += 1;
                        }
                        results.push(result);
                        if results.len() % every == 0 && results.len() < total {
                            sink.progress(&ProgressEvent::Probing {
                                tested: results.len(),
                                total,
                                healthy,
                            })
                            .await;
                        }
                    }
                    None => break,
                },
            }
        }

        sink.progress(&ProgressEvent::Probing {
            tested: results.len(),
            total,
            healthy,
        })
        .await;

        (results, interrupt)
    }
}
