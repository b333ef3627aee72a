// =============================================================================
// GateEvaluator — pure function: snapshot-candidate state -> admission verdict
// =============================================================================
//
// Free of I/O and clock calls — every input arrives as a parameter — in the
// same shape as a `SmartFilterEngine::evaluate`-style pure predicate over
// already-computed inputs rather than live state. Every gate is evaluated
// every cycle — no short-circuit — and all failing reasons are reported, in
// the fixed order of [`ReasonCode::ORDER`].
// =============================================================================

use crate::snapshot::GateMetrics;
use crate::types::{Intent, MdMode, ReasonCode};

/// Thresholds the evaluator is parameterized over. Never hard-coded inside
/// `evaluate` itself — sourced from [`crate::config::Config`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateThresholds {
    pub stale_threshold_ms: f64,
    pub feed_heartbeat_timeout_ms: u64,
    pub max_spread_ticks: u64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            stale_threshold_ms: 2000.0,
            feed_heartbeat_timeout_ms: 5000,
            max_spread_ticks: 8,
        }
    }
}

/// All the facts one gate evaluation needs, assembled by the Engine each
/// cycle from its internal state after the derivation phase.
#[derive(Debug, Clone, Copy)]
pub struct GateInputs {
    pub arm: bool,
    pub intent: Intent,
    pub in_operating_window: bool,
    pub is_break_window: bool,
    pub connected: bool,
    pub md_mode: MdMode,
    pub con_id: Option<u64>,
    pub quote_present: bool,
    pub staleness_ms: Option<f64>,
    pub now_mono_ns: u64,
    pub last_quote_event_mono_ns: u64,
    pub spread_ticks: Option<u64>,
    pub engine_degraded: bool,
    pub cycle_ms: f64,
}

/// Output of a single gate evaluation: the ordered reason codes (wire
/// strings) and the always-present metrics map.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub allowed: bool,
    pub reason_codes: Vec<String>,
    pub gate_metrics: GateMetrics,
}

/// Evaluate the fixed gate set in order, reporting every failing reason —
/// no short-circuit.
pub fn evaluate(inputs: &GateInputs, thresholds: &GateThresholds) -> GateOutcome {
    let mut fired: Vec<ReasonCode> = Vec::with_capacity(ReasonCode::ORDER.len());

    // 1. ARM_OFF
    if !inputs.arm {
        fired.push(ReasonCode::ArmOff);
    }
    // 2. INTENT_FLAT
    if inputs.intent == Intent::Flat {
        fired.push(ReasonCode::IntentFlat);
    }
    // 3. OUTSIDE_OPERATING_WINDOW
    if !inputs.in_operating_window {
        fired.push(ReasonCode::OutsideOperatingWindow);
    }
    // 4. SESSION_BREAK
    if inputs.is_break_window {
        fired.push(ReasonCode::SessionBreak);
    }
    // 5. FEED_DISCONNECTED
    if !inputs.connected {
        fired.push(ReasonCode::FeedDisconnected);
    }
    // 6. MD_NOT_REALTIME
    if inputs.md_mode != MdMode::Realtime {
        fired.push(ReasonCode::MdNotRealtime);
    }
    // 7. NO_CONTRACT
    if inputs.con_id.is_none() {
        fired.push(ReasonCode::NoContract);
    }
    // 8. STALE_DATA
    let heartbeat_age_ns = inputs.now_mono_ns.saturating_sub(inputs.last_quote_event_mono_ns);
    let heartbeat_timeout_ns = thresholds.feed_heartbeat_timeout_ms.saturating_mul(1_000_000);
    let heartbeat_timed_out = heartbeat_age_ns > heartbeat_timeout_ns;
    let stale = !inputs.quote_present
        || inputs
            .staleness_ms
            .map_or(false, |ms| ms > thresholds.stale_threshold_ms)
        || heartbeat_timed_out;
    if stale {
        fired.push(ReasonCode::StaleData);
    }
    // 9. SPREAD_UNAVAILABLE
    let spread_unavailable = inputs.spread_ticks.is_none();
    if spread_unavailable {
        fired.push(ReasonCode::SpreadUnavailable);
    }
    // 10. SPREAD_WIDE (skipped if 9 fired)
    if !spread_unavailable {
        if let Some(ticks) = inputs.spread_ticks {
            if ticks > thresholds.max_spread_ticks {
                fired.push(ReasonCode::SpreadWide);
            }
        }
    }
    // 11. ENGINE_DEGRADED
    if inputs.engine_degraded {
        fired.push(ReasonCode::EngineDegraded);
    }

    let reason_codes: Vec<String> = fired.iter().map(|r| r.as_str().to_string()).collect();
    let gate_metrics = GateMetrics {
        staleness_ms: inputs.staleness_ms,
        spread_ticks: inputs.spread_ticks,
        md_mode: inputs.md_mode,
        connected: inputs.connected,
        in_operating_window: inputs.in_operating_window,
        is_break_window: inputs.is_break_window,
        engine_degraded: inputs.engine_degraded,
        cycle_ms: inputs.cycle_ms,
    };

    GateOutcome {
        allowed: reason_codes.is_empty(),
        reason_codes,
        gate_metrics,
    }
}
