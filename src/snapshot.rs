// =============================================================================
// Snapshot model — the immutable, versioned, atomically-published state view
// =============================================================================
//
// Expressed as a composition of small immutable sub-structures (instrument,
// feed, quote, session, controls, loop, gates), each with the same
// lifetime as its parent. Cloning a `Snapshot` is cheap: every field is a
// small Copy type or a short `Vec`/`String`.
// =============================================================================

use serde::Serialize;

use crate::types::{Intent, MdMode, ReasonCode};

/// Schema version carried on every published snapshot. Bump the suffix on
/// any breaking field change.
pub const SCHEMA_VERSION: &str = "snapshot.v1";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentBlock {
    pub symbol: String,
    /// `SYMBOL.YYYYMM`, validated at [`crate::config::Config`] load time.
    pub contract_key: String,
    pub con_id: Option<u64>,
    pub tick_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedBlock {
    pub connected: bool,
    pub md_mode: MdMode,
    pub degraded: bool,
    pub status_reason_codes: Vec<String>,
    pub last_status_change_mono_ns: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessBlock {
    pub last_any_event_mono_ns: u64,
    pub last_quote_event_mono_ns: u64,
    pub quotes_received_count: u64,
}

/// All fields are optional, but present or absent together: bid/ask/last
/// arrive and are cleared as a unit with each quote event (invariants 4/5/7).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteBlock {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub bid_size: Option<u64>,
    pub ask_size: Option<u64>,
    pub ts_recv_mono_ns: u64,
    pub ts_recv_unix_ms: u64,
    pub ts_exch_unix_ms: Option<u64>,
    /// Derived: `(cycle_start_mono_ns - ts_recv_mono_ns) / 1e6`, clamped
    /// non-negative. Computed by the Engine at derivation time, not here.
    pub staleness_ms: Option<f64>,
    /// Derived: `ceil((ask - bid) / tick_size)` when bid/ask are both
    /// present, positive, and `ask > bid`; `None` otherwise.
    pub spread_ticks: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionBlock {
    pub in_operating_window: bool,
    pub is_break_window: bool,
    pub session_date_iso: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlsBlock {
    pub intent: Intent,
    pub arm: bool,
    pub last_cmd_id: Option<u64>,
    pub last_cmd_ts_unix_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopBlock {
    pub cycle_ms: f64,
    pub cycle_overrun: bool,
    pub engine_degraded: bool,
    pub last_cycle_start_mono_ns: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatesBlock {
    pub allowed: bool,
    pub reason_codes: Vec<String>,
    pub gate_metrics: GateMetrics,
}

/// Always carries all of the named keys; values are `null` when not
/// meaningful for the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct GateMetrics {
    pub staleness_ms: Option<f64>,
    pub spread_ticks: Option<u64>,
    pub md_mode: MdMode,
    pub connected: bool,
    pub in_operating_window: bool,
    pub is_break_window: bool,
    pub engine_degraded: bool,
    pub cycle_ms: f64,
}

/// The immutable, atomically-published view of engine state for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    // -- Identity ---------------------------------------------------------
    pub schema_version: &'static str,
    pub app_version: String,
    pub config_hash: String,
    pub run_id: String,
    pub run_start_ts_unix_ms: u64,
    pub snapshot_id: u64,
    pub cycle_count: u64,
    pub ts_unix_ms: u64,
    pub ts_mono_ns: u64,

    // -- Instrument ---------------------------------------------------------
    pub instrument: InstrumentBlock,

    // -- Feed ---------------------------------------------------------------
    pub feed: FeedBlock,

    // -- Liveness -------------------------------------------------------------
    pub liveness: LivenessBlock,

    // -- Quote (optional) -----------------------------------------------------
    pub quote: Option<QuoteBlock>,

    // -- Session --------------------------------------------------------------
    pub session: SessionBlock,

    // -- Controls ---------------------------------------------------------------
    pub controls: ControlsBlock,

    // -- Loop health --------------------------------------------------------------
    pub loop_health: LoopBlock,

    // -- Gates ---------------------------------------------------------------------
    pub gates: GatesBlock,

    // -- Mirrors: ready == allowed, ready_reasons == reason_codes (invariant 3) --
    pub ready: bool,
    pub ready_reasons: Vec<String>,
}

impl Snapshot {
    /// Compute `spread_ticks = ceil((ask - bid) / tick_size)`, or `None` if
    /// the spread is undefined per invariant 4.
    pub fn spread_ticks(bid: Option<f64>, ask: Option<f64>, tick_size: f64) -> Option<u64> {
        let (bid, ask) = match (bid, ask) {
            (Some(b), Some(a)) if b > 0.0 && a > 0.0 && a > b => (b, a),
            _ => return None,
        };
        debug_assert!(tick_size > 0.0, "tick_size must be > 0 (invariant 7)");
        let ticks = ((ask - bid) / tick_size).ceil();
        Some(ticks.max(0.0) as u64)
    }

    /// `contract_key` must match `^[A-Z]+\.\d{6}$` (invariant 6).
    pub fn validate_contract_key(key: &str) -> bool {
        let Some((sym, ym)) = key.split_once('.') else {
            return false;
        };
        !sym.is_empty()
            && sym.chars().all(|c| c.is_ascii_uppercase())
            && ym.len() == 6
            && ym.chars().all(|c| c.is_ascii_digit())
    }
}
