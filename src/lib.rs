//! Proxy Scout - regional HTTP proxy discovery
//!
//! Collects public proxy lists, keeps the proxies located in a target
//! region, checks that each one forwards requests, and reports the working
//! ones ranked by latency.

pub mod config;
pub mod error;
pub mod proxy;
pub mod report;
pub mod run;
pub mod sink;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use proxy::*;
pub use report::{Report, ReportConfig};
pub use run::{Scout, Trigger};
pub use sink::{ConsoleSinkProvider, NullSink, ProgressEvent, RunSink, SinkProvider};
pub use state::{CancelSignal, Interrupt, RunState};
