//! Per-run state and cancellation

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

/// Why a stage stopped before finishing its work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The run-level deadline passed
    DeadlineExceeded,
    /// The external cancel signal fired
    Cancelled,
}

/// Run-level deadline plus an optional external cancel flag
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn none() -> Self {
        Self::default()
    }

    /// Create a signal and the sender that fires it
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (
            tx,
            Self {
                cancel: Some(rx),
                deadline: None,
            },
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Resolve once the signal fires. Pends forever when neither a deadline
    /// nor a cancel channel is set.
    pub async fn fired(&self) -> Interrupt {
        let mut cancel = self.cancel.clone();
        let cancelled = async {
            match cancel.as_mut() {
                Some(rx) => {
                    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    // a dropped sender can no longer cancel
                    if closed {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Interrupt::Cancelled,
            _ = deadline => Interrupt::DeadlineExceeded,
        }
    }
}

/// Counters gathered across the stages of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub sources_total: usize,
    pub sources_failed: usize,
    pub extracted: usize,
    pub unique: usize,
    pub in_region: usize,
    pub probed: usize,
    pub healthy: usize,
}

/// State owned by a single triggered run
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: Uuid,
    pub region: String,
    pub started_at: DateTime<Local>,
    pub stats: RunStats,
    pub cancel: CancelSignal,
    pub interrupted: Option<Interrupt>,
}

impl RunState {
    pub fn new(region: impl Into<String>, cancel: CancelSignal) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            region: region.into().to_uppercase(),
            started_at: Local::now(),
            stats: RunStats::default(),
            cancel,
            interrupted: None,
        }
    }

    /// Record an interrupt, keeping the first one seen
    pub fn interrupt(&mut self, interrupt: Interrupt) {
        self.interrupted.get_or_insert(interrupt);
    }

    pub fn is_cancelled(&self) -> bool {
        self.interrupted == Some(Interrupt::Cancelled)
    }
}
