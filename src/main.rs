use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proxy_scout::{
    proxy::{ProxyChecker, ProxyParser, ProxySource},
    report::Report,
    sink::{ConsoleSink, ConsoleSinkProvider, ReportTarget},
    CancelSignal, Config, RunSink, Scout, Trigger,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Find working HTTP proxies located in a target region
#[derive(Parser)]
#[command(name = "proxy-scout")]
#[command(about = "Find working HTTP proxies located in a target region")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect, filter, check and report proxies
    Run {
        /// Target region code, overrides the configuration
        #[arg(short, long)]
        region: Option<String>,
        /// Report destination: "-" for stdout or a file path
        #[arg(short, long, default_value = "-")]
        output: String,
        /// Proxy list URL to use instead of the configured sources (repeatable)
        #[arg(short, long)]
        source: Vec<String>,
        /// Number of concurrent proxy checks
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,
        /// Timeout in seconds for each proxy check
        #[arg(long)]
        probe_timeout: Option<u64>,
        /// Number of proxies listed in the report
        #[arg(long)]
        top: Option<usize>,
        /// Abort network work after this many seconds
        #[arg(long)]
        run_timeout: Option<u64>,
    },
    /// Extract unique ip:port candidates from a file
    Extract {
        /// Input file containing proxies in any text format
        input: PathBuf,
    },
    /// Check proxies from a file and print them ranked by latency
    Check {
        /// Input file containing proxies in any text format
        input: PathBuf,
        /// Number of concurrent checks
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,
        /// Timeout in seconds for each check
        #[arg(long)]
        timeout: Option<u64>,
        /// URL to test proxies against
        #[arg(long)]
        test_url: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let command = cli.command.unwrap_or(Commands::Run {
        region: None,
        output: "-".to_string(),
        source: Vec::new(),
        concurrency: None,
        probe_timeout: None,
        top: None,
        run_timeout: None,
    });

    match command {
        Commands::Run {
            region,
            output,
            source,
            concurrency,
            probe_timeout,
            top,
            run_timeout,
        } => {
            if !source.is_empty() {
                config.sources = source.iter().map(|url| ProxySource::from_url(url)).collect();
            }
            if let Some(n) = concurrency {
                config.checker.concurrency = n;
            }
            if let Some(secs) = probe_timeout {
                config.checker = config.checker.with_timeout(Duration::from_secs(secs));
            }
            if let Some(top) = top {
                config.report.max_reported = top;
            }
            if run_timeout.is_some() {
                config.run_timeout_secs = run_timeout;
            }

            let scout = Scout::new(config)
                .context("invalid configuration")?
                .with_sinks(Arc::new(ConsoleSinkProvider));
            let mut trigger = Trigger::new(output);
            if let Some(region) = region {
                trigger = trigger.with_region(region);
            }

            let (cancel_tx, cancel) = CancelSignal::channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling run");
                    let _ = cancel_tx.send(true);
                }
            });

            let report = scout.handle(trigger, cancel).await?;
            info!(healthy = report.total, listed = report.listed.len(), "done");
        }
        Commands::Extract { input } => {
            let candidates = ProxyParser::dedup(ProxyParser::extract_file(&input)?);
            info!("extracted {} unique candidates from {:?}", candidates.len(), input);
            for candidate in &candidates {
                println!("{candidate}");
            }
        }
        Commands::Check {
            input,
            concurrency,
            timeout,
            test_url,
        } => {
            let mut checker_config = config.checker.clone();
            if let Some(n) = concurrency {
                checker_config = checker_config.with_concurrency(n);
            }
            if let Some(secs) = timeout {
                checker_config = checker_config.with_timeout(Duration::from_secs(secs));
            }
            if let Some(url) = test_url {
                checker_config = checker_config.with_test_url(url);
            }

            let candidates = ProxyParser::dedup(ProxyParser::extract_file(&input)?);
            info!(
                "checking {} proxies with {} concurrent checks, timeout {}ms",
                candidates.len(),
                checker_config.concurrency,
                checker_config.timeout_ms
            );

            let checker = ProxyChecker::new(checker_config);
            let sink = ConsoleSink::new(ReportTarget::Stdout);
            let (results, _) = checker
                .check_proxies(candidates, &CancelSignal::none(), &sink)
                .await;
            let working = results
                .into_iter()
                .filter_map(|result| result.into_working())
                .collect();

            let report = Report::build(working, "listed", config.report.max_reported);
            for chunk in report.chunks(config.report.chunk_limit) {
                sink.deliver(&chunk).await?;
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Log to stderr so the report owns stdout
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
