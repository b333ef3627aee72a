// =============================================================================
// Metrics & Summary — run counters, gauges, and the shutdown report
// =============================================================================
//
// Owned exclusively by the Engine (single-writer), so relaxed ordering
// would suffice for the counters themselves; `SeqCst` is used anyway for
// the handful of loads/stores here since they are cold-path (once per
// cycle at most) and a consistent shutdown snapshot matters more than the
// few nanoseconds saved.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;

#[derive(Default)]
pub struct Metrics {
    pub reconnect_count: AtomicU64,
    pub staleness_events_count: AtomicU64,
    pub quotes_received_count: AtomicU64,
    pub cycle_count: AtomicU64,
    /// Gauge: high-water mark of `cycle_ms`, stored as milli-units (x1000)
    /// in an integer so it can be a plain atomic.
    max_cycle_time_ms_milli: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reconnect(&self) {
        self.reconnect_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_staleness_event(&self) {
        self.staleness_events_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_quote_received(&self) {
        self.quotes_received_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_cycle(&self, cycle_ms: f64) {
        self.cycle_count.fetch_add(1, Ordering::SeqCst);
        let milli = (cycle_ms * 1000.0).round().max(0.0) as u64;
        self.max_cycle_time_ms_milli.fetch_max(milli, Ordering::SeqCst);
    }

    pub fn max_cycle_time_ms(&self) -> f64 {
        self.max_cycle_time_ms_milli.load(Ordering::SeqCst) as f64 / 1000.0
    }

    pub fn summary(
        &self,
        run_id: &str,
        run_start_ts_unix_ms: u64,
        run_end_ts_unix_ms: u64,
        logger_enabled: bool,
    ) -> RunSummary {
        RunSummary {
            run_id: run_id.to_string(),
            run_start_ts_unix_ms,
            run_end_ts_unix_ms,
            uptime_s: run_end_ts_unix_ms.saturating_sub(run_start_ts_unix_ms) / 1000,
            reconnect_count: self.reconnect_count.load(Ordering::SeqCst),
            staleness_events_count: self.staleness_events_count.load(Ordering::SeqCst),
            quotes_received_count: self.quotes_received_count.load(Ordering::SeqCst),
            cycle_count: self.cycle_count.load(Ordering::SeqCst),
            max_cycle_time_ms: self.max_cycle_time_ms(),
            logger_enabled,
        }
    }
}

/// Human-readable (and machine-parseable) end-of-run summary, emitted via
/// structured `tracing::info!` fields rather than freeform text.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_start_ts_unix_ms: u64,
    pub run_end_ts_unix_ms: u64,
    pub uptime_s: u64,
    pub reconnect_count: u64,
    pub staleness_events_count: u64,
    pub quotes_received_count: u64,
    pub cycle_count: u64,
    pub max_cycle_time_ms: f64,
    pub logger_enabled: bool,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            uptime_s = self.uptime_s,
            reconnect_count = self.reconnect_count,
            staleness_events_count = self.staleness_events_count,
            quotes_received_count = self.quotes_received_count,
            cycle_count = self.cycle_count,
            max_cycle_time_ms = self.max_cycle_time_ms,
            logger_enabled = self.logger_enabled,
            "run summary"
        );
    }
}
