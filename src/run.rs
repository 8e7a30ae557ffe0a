//! The discovery pipeline: fetch, extract, dedup, geo-filter, probe, report

use crate::config::Config;
use crate::error::Error;
use crate::proxy::checker::{ProxyChecker, ProxyProbe};
use crate::proxy::crawler::ProxyCrawler;
use crate::proxy::geo::{CountryLookup, GeoFilter};
use crate::proxy::models::{ProxyCandidate, WorkingProxy};
use crate::proxy::parser::ProxyParser;
use crate::proxy::region::RegionTable;
use crate::report::Report;
use crate::sink::{ConsoleSinkProvider, ProgressEvent, RunSink, SinkProvider};
use crate::state::{CancelSignal, Interrupt, RunState};
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Request to run the pipeline once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Where progress and the report go, resolved by the [`SinkProvider`]
    pub destination: String,
    /// Target region overriding the configured one
    pub region: Option<String>,
}

impl Trigger {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Runs the pipeline against immutable configuration.
///
/// A `Scout` holds no per-run state, so concurrent runs are independent.
#[derive(Clone)]
pub struct Scout {
    config: Arc<Config>,
    table: Arc<RegionTable>,
    crawler: ProxyCrawler,
    geo: GeoFilter,
    checker: ProxyChecker,
    sinks: Arc<dyn SinkProvider>,
}

impl Scout {
    /// Validate `config` and build the HTTP-backed pipeline
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let table = Arc::new(config.region_table()?);
        let crawler = ProxyCrawler::with_config(config.crawler.clone())?;
        let geo = GeoFilter::from_config(&config.geo, &config.region, Arc::clone(&table))?;
        let checker = ProxyChecker::new(config.checker.clone());

        Ok(Self {
            config: Arc::new(config),
            table,
            crawler,
            geo,
            checker,
            sinks: Arc::new(ConsoleSinkProvider),
        })
    }

    /// Replace the fallback country lookup
    pub fn with_lookup(mut self, lookup: Option<Arc<dyn CountryLookup>>) -> Self {
        self.geo = GeoFilter::new(
            &self.config.region,
            Arc::clone(&self.table),
            lookup,
            self.config.geo.concurrency,
        );
        self
    }

    /// Replace the liveness probe
    pub fn with_probe(mut self, probe: Arc<dyn ProxyProbe>) -> Self {
        self.checker = ProxyChecker::with_probe(self.config.checker.clone(), probe);
        self
    }

    pub fn with_sinks(mut self, sinks: Arc<dyn SinkProvider>) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle a trigger: open the sink for its destination and run
    pub async fn handle(&self, trigger: Trigger, cancel: CancelSignal) -> Result<Report> {
        let sink = self.sinks.open(&trigger.destination).map_err(|e| {
            error!(destination = %trigger.destination, error = %e, "cannot open destination");
            e
        })?;
        self.execute(&trigger, cancel, sink.as_ref()).await
    }

    /// Run the pipeline for `trigger`, delivering to `sink`
    pub async fn execute(
        &self,
        trigger: &Trigger,
        cancel: CancelSignal,
        sink: &dyn RunSink,
    ) -> Result<Report> {
        let region = trigger
            .region
            .clone()
            .unwrap_or_else(|| self.config.region.clone());
        if !crate::config::is_region_code(&region) {
            return Err(Error::InvalidConfig(format!(
                "region '{region}' is not a two-letter country code"
            )));
        }

        let cancel = match self.config.run_timeout() {
            Some(timeout) => cancel.with_timeout(timeout),
            None => cancel,
        };
        let mut state = RunState::new(region, cancel);
        let span = info_span!("run", run_id = %state.run_id, region = %state.region);

        self.run(&mut state, sink).instrument(span).await
    }

    /// Run every stage in order with an existing run state
    pub async fn run(&self, state: &mut RunState, sink: &dyn RunSink) -> Result<Report> {
        sink.progress(&ProgressEvent::Started {
            region: state.region.clone(),
        })
        .await;

        let candidates = self.collect(state, sink).await;
        bail_if_cancelled(state)?;

        let in_region = if state.interrupted.is_none() {
            self.filter_region(candidates, state, sink).await
        } else {
            Vec::new()
        };
        bail_if_cancelled(state)?;

        let working = if state.interrupted.is_none() {
            self.probe(in_region, state, sink).await
        } else {
            Vec::new()
        };
        bail_if_cancelled(state)?;

        if state.interrupted == Some(Interrupt::DeadlineExceeded) {
            warn!("run deadline exceeded, reporting partial results");
        }

        let report = Report::build(working, &state.region, self.config.report.max_reported);
        for chunk in report.chunks(self.config.report.chunk_limit) {
            sink.deliver(&chunk).await?;
        }

        info!(
            healthy = report.total,
            elapsed_ms = (chrono::Local::now() - state.started_at).num_milliseconds(),
            "run finished"
        );
        Ok(report)
    }

    /// Fetch every source in order, then extract and dedup
    pub async fn collect(&self, state: &mut RunState, sink: &dyn RunSink) -> Vec<ProxyCandidate> {
        let sources = &self.config.sources;
        let total = sources.len();
        state.stats.sources_total = total;
        let cancel = state.cancel.clone();
        let mut all = Vec::new();

        for (i, source) in sources.iter().enumerate() {
            sink.progress(&ProgressEvent::FetchingSource {
                index: i + 1,
                total,
                name: source.name.clone(),
            })
            .await;

            let result = tokio::select! {
                biased;
                fired = cancel.fired() => {
                    state.interrupt(fired);
                    break;
                }
                result = self.crawler.crawl_source(source) => result,
            };

            if !result.is_success() {
                state.stats.sources_failed += 1;
            }
            all.extend(result.proxies);
        }

        state.stats.extracted = all.len();
        let unique = ProxyParser::dedup(all);
        state.stats.unique = unique.len();

        info!(
            sources = total,
            failed = state.stats.sources_failed,
            extracted = state.stats.extracted,
            unique = state.stats.unique,
            "sources collected"
        );
        sink.progress(&ProgressEvent::SourcesCollected {
            extracted: state.stats.extracted,
            unique: state.stats.unique,
        })
        .await;

        unique
    }

    /// Keep candidates in the target region, preserving input order
    pub async fn filter_region(
        &self,
        candidates: Vec<ProxyCandidate>,
        state: &mut RunState,
        sink: &dyn RunSink,
    ) -> Vec<ProxyCandidate> {
        sink.progress(&ProgressEvent::FilteringRegion {
            candidates: candidates.len(),
            region: state.region.clone(),
        })
        .await;

        let filter = self.filter_for(&state.region);
        let (decisions, interrupt) = filter.classify_all(candidates.clone(), &state.cancel).await;
        if let Some(interrupt) = interrupt {
            state.interrupt(interrupt);
        }

        let accepted: HashSet<ProxyCandidate> = decisions
            .into_iter()
            .filter(|decision| decision.in_region)
            .map(|decision| decision.candidate)
            .collect();
        let in_region: Vec<_> = candidates
            .into_iter()
            .filter(|candidate| accepted.contains(candidate))
            .collect();

        state.stats.in_region = in_region.len();
        info!(in_region = in_region.len(), "region filter done");
        sink.progress(&ProgressEvent::RegionFiltered {
            in_region: in_region.len(),
            region: state.region.clone(),
        })
        .await;

        in_region
    }

    /// Probe candidates and keep the reachable ones
    pub async fn probe(
        &self,
        candidates: Vec<ProxyCandidate>,
        state: &mut RunState,
        sink: &dyn RunSink,
    ) -> Vec<WorkingProxy> {
        let (results, interrupt) = self
            .checker
            .check_proxies(candidates, &state.cancel, sink)
            .await;
        if let Some(interrupt) = interrupt {
            state.interrupt(interrupt);
        }

        state.stats.probed = results.len();
        let working: Vec<_> = results
            .into_iter()
            .filter_map(|result| result.into_working())
            .collect();
        state.stats.healthy = working.len();

        info!(
            probed = state.stats.probed,
            healthy = state.stats.healthy,
            "probing done"
        );
        working
    }

    /// The configured filter, or one without static ranges for an override
    /// region since the table only describes the configured region
    fn filter_for(&self, region: &str) -> GeoFilter {
        if region.eq_ignore_ascii_case(self.geo.region()) {
            self.geo.clone()
        } else {
            self.geo.for_region(region, Arc::new(RegionTable::default()))
        }
    }
}

fn bail_if_cancelled(state: &RunState) -> Result<()> {
    if state.is_cancelled() {
        warn!("run cancelled");
        return Err(Error::Cancelled);
    }
    Ok(())
}
