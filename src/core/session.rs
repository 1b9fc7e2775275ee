//! Request cycle and fetch telemetry, threaded explicitly through every lookup.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::core::client::IpFamily;
use crate::core::{FallbackTier, FxError, RateOrigin};

/// Counters accumulated while fetching.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FetchMetrics {
    /// HTTP attempts actually issued.
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    /// Attempts refused because the cycle budget was already spent.
    pub deadline_exceeded: u32,
    pub tls_hostname_mismatch: u32,
    pub dns_a_count: usize,
    pub dns_aaaa_count: usize,
    pub ip_family_used: IpFamily,
    /// Set when the PBOC directory scan gave up after consecutive unreadable pages.
    pub early_stop: bool,
    pub rate_source: Option<RateOrigin>,
    pub fallback_used: Option<FallbackTier>,
}

/// The per-lookup context: an optional cycle deadline plus the metrics it accumulates.
///
/// One session serves one caller; concurrent lookups use separate sessions.
#[derive(Debug, Default)]
pub struct FetchSession {
    cycle_end: Option<Instant>,
    cycle_active: bool,
    metrics: FetchMetrics,
}

impl FetchSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a cycle whose attempts all share one deadline. `None` runs without a budget.
    pub fn begin_cycle(&mut self, total_deadline: Option<Duration>) -> Result<(), FxError> {
        if self.cycle_active {
            return Err(FxError::Config("request cycle already active".into()));
        }
        self.cycle_active = true;
        self.cycle_end = total_deadline.map(|d| Instant::now() + d);
        debug!(deadline = ?total_deadline, "request cycle started");
        Ok(())
    }

    /// Drop the cycle deadline. Calling it without an active cycle is a no-op.
    pub fn end_cycle(&mut self) {
        if self.cycle_active {
            debug!("request cycle ended");
        }
        self.cycle_active = false;
        self.cycle_end = None;
    }

    pub fn cycle_active(&self) -> bool {
        self.cycle_active
    }

    /// Absolute end of the active cycle, if it has one.
    pub fn cycle_deadline(&self) -> Option<Instant> {
        self.cycle_end
    }

    /// Snapshot of the counters.
    pub fn metrics(&self) -> FetchMetrics {
        self.metrics.clone()
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = FetchMetrics::default();
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut FetchMetrics {
        &mut self.metrics
    }
}

/// Time left until `end`, saturating at zero. `None` for an unbounded deadline.
pub(crate) fn remaining(end: Option<Instant>) -> Option<Duration> {
    end.map(|e| e.saturating_duration_since(Instant::now()))
}
