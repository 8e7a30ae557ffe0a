//! Output side of a run: progress updates and report chunks

use crate::Result;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Spinner redraw interval
const SPINNER_TICK: Duration = Duration::from_millis(120);

/// Status update emitted while a run progresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { region: String },
    FetchingSource { index: usize, total: usize, name: String },
    SourcesCollected { extracted: usize, unique: usize },
    FilteringRegion { candidates: usize, region: String },
    RegionFiltered { in_region: usize, region: String },
    Probing { tested: usize, total: usize, healthy: usize },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Started { region } => {
                write!(f, "searching for {region} proxies, please wait...")
            }
            ProgressEvent::FetchingSource { index, total, name } => {
                write!(f, "checking source {index}/{total} ({name})")
            }
            ProgressEvent::SourcesCollected { extracted, unique } => {
                write!(f, "found {unique} unique proxies ({extracted} listed)")
            }
            ProgressEvent::FilteringRegion { candidates, region } => {
                write!(f, "filtering {candidates} proxies by region {region}")
            }
            ProgressEvent::RegionFiltered { in_region, region } => {
                write!(f, "{in_region} proxies in {region}, testing...")
            }
            ProgressEvent::Probing {
                tested,
                total,
                healthy,
            } => write!(f, "tested {tested}/{total}, {healthy} healthy"),
        }
    }
}

/// Receives progress and the final report of one run
#[async_trait]
pub trait RunSink: Send + Sync {
    /// Replace the current status line
    async fn progress(&self, event: &ProgressEvent);

    /// Deliver one report chunk; chunks arrive in report order
    async fn deliver(&self, chunk: &str) -> Result<()>;
}

/// Resolves a trigger's destination to a sink
pub trait SinkProvider: Send + Sync {
    fn open(&self, destination: &str) -> Result<Box<dyn RunSink>>;
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl RunSink for NullSink {
    async fn progress(&self, _event: &ProgressEvent) {}

    async fn deliver(&self, _chunk: &str) -> Result<()> {
        Ok(())
    }
}

/// Where a [`ConsoleSink`] writes report chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportTarget {
    Stdout,
    File(PathBuf),
}

/// Terminal sink: spinner status line on stderr, report on stdout or a file
pub struct ConsoleSink {
    target: ReportTarget,
    status: ProgressBar,
}

impl ConsoleSink {
    pub fn new(target: ReportTarget) -> Self {
        let status = ProgressBar::new_spinner();
        status.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { target, status }
    }

    pub fn target(&self) -> &ReportTarget {
        &self.target
    }
}

#[async_trait]
impl RunSink for ConsoleSink {
    async fn progress(&self, event: &ProgressEvent) {
        if self.status.is_finished() {
            return;
        }
        self.status.enable_steady_tick(SPINNER_TICK);
        self.status.set_message(event.to_string());
    }

    async fn deliver(&self, chunk: &str) -> Result<()> {
        self.status.finish_and_clear();
        match &self.target {
            ReportTarget::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(chunk.as_bytes())?;
                stdout.flush()?;
            }
            ReportTarget::File(path) => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(chunk.as_bytes()).await?;
                file.flush().await?;
            }
        }
        Ok(())
    }
}

/// Maps `-` to stdout and anything else to a report file path.
///
/// A file destination is truncated when opened so each run starts clean.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSinkProvider;

impl SinkProvider for ConsoleSinkProvider {
    fn open(&self, destination: &str) -> Result<Box<dyn RunSink>> {
        let target = match destination.trim() {
            "" | "-" => ReportTarget::Stdout,
            path => {
                let path = PathBuf::from(path);
                std::fs::File::create(&path)?;
                ReportTarget::File(path)
            }
        };
        Ok(Box::new(ConsoleSink::new(target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_display() {
        let event = ProgressEvent::FetchingSource {
            index: 2,
            total: 4,
            name: "TheSpeedX".to_string(),
        };
        assert_eq!(event.to_string(), "checking source 2/4 (TheSpeedX)");

        let event = ProgressEvent::Probing {
            tested: 10,
            total: 25,
            healthy: 3,
        };
        assert_eq!(event.to_string(), "tested 10/25, 3 healthy");
    }

    #[tokio::test]
    async fn test_console_status_cleared_before_report() {
        let sink = ConsoleSink::new(ReportTarget::Stdout);
        sink.progress(&ProgressEvent::Started {
            region: "IR".to_string(),
        })
        .await;
        assert_eq!(sink.status.message(), "searching for IR proxies, please wait...");

        sink.deliver("").await.unwrap();
        assert!(sink.status.is_finished());

        sink.progress(&ProgressEvent::Probing {
            tested: 1,
            total: 1,
            healthy: 1,
        })
        .await;
        assert_eq!(sink.status.message(), "searching for IR proxies, please wait...");
    }

    #[test]
    fn test_provider_stdout() {
        let provider = ConsoleSinkProvider;
        assert!(provider.open("-").is_ok());
    }

    #[tokio::test]
    async fn test_file_sink_appends_chunks_in_order() {
        let path = std::env::temp_dir().join(format!("proxy-scout-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "stale").unwrap();

        let provider = ConsoleSinkProvider;
        let sink = provider.open(path.to_str().unwrap()).unwrap();
        sink.deliver("first\n").await.unwrap();
        sink.deliver("second\n").await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, "first\nsecond\n");
    }
}
