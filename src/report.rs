//! Ranking working proxies and rendering the size-bounded report

use crate::proxy::models::WorkingProxy;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Default number of proxies listed in a report
const DEFAULT_MAX_REPORTED: usize = 20;

/// Default maximum characters per report chunk
const DEFAULT_CHUNK_LIMIT: usize = 4000;

/// Configuration for report rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Maximum proxies listed; the total is still reported
    pub max_reported: usize,
    /// Maximum characters per delivered chunk
    pub chunk_limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_reported: DEFAULT_MAX_REPORTED,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
        }
    }
}

impl ReportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_reported(mut self, max_reported: usize) -> Self {
        self.max_reported = max_reported;
        self
    }

    pub fn with_chunk_limit(mut self, chunk_limit: usize) -> Self {
        self.chunk_limit = chunk_limit;
        self
    }
}

/// Sort by latency ascending, ties by `(host, port)`
pub fn rank(mut working: Vec<WorkingProxy>) -> Vec<WorkingProxy> {
    working.sort_by(WorkingProxy::rank_cmp);
    working
}

/// Ranked and truncated result of one run
#[derive(Debug, Clone)]
pub struct Report {
    pub region: String,
    pub total: usize,
    pub listed: Vec<WorkingProxy>,
    pub generated_at: DateTime<Local>,
}

impl Report {
    pub fn build(working: Vec<WorkingProxy>, region: &str, max_reported: usize) -> Self {
        Self::build_at(working, region, max_reported, Local::now())
    }

    pub fn build_at(
        working: Vec<WorkingProxy>,
        region: &str,
        max_reported: usize,
        generated_at: DateTime<Local>,
    ) -> Self {
        let total = working.len();
        let mut listed = rank(working);
        listed.truncate(max_reported);
        Self {
            region: region.to_string(),
            total,
            listed,
            generated_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Render the whole report as one string
    pub fn render(&self) -> String {
        if self.is_empty() {
            return format!(
                "No healthy {} proxies found.\nPlease try again later.\n",
                self.region
            );
        }

        let mut out = String::new();
        let _ = writeln!(out, "Healthy {} proxies ({} found)", self.region, self.total);
        let _ = writeln!(out, "Updated: {}", self.generated_at.format("%H:%M:%S"));
        out.push('\n');

        for proxy in &self.listed {
            let _ = writeln!(out, "`{}` - {:.2}ms", proxy.candidate, proxy.latency_ms);
        }

        let hidden = self.total - self.listed.len();
        if hidden > 0 {
            let _ = writeln!(out, "\n... and {hidden} more");
        }

        out
    }

    /// Render and split into chunks of at most `limit` characters
    pub fn chunks(&self, limit: usize) -> Vec<String> {
        split_chunks(&self.render(), limit)
    }
}

/// Split text into ordered chunks of at most `limit` characters.
///
/// Lines are packed whole where possible; a line longer than `limit` is
/// split mid-line. Concatenating the chunks yields `text` unchanged.
pub fn split_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > limit && current_len > 0 {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        for ch in line.chars() {
            if current_len == limit {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(ch);
            current_len += 1;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
