// =============================================================================
// Engine — the single-writer cycle loop
// =============================================================================
//
// Drains inbound events, applies coalesced commands at the cycle boundary,
// updates liveness, evaluates gates, publishes a snapshot, and tracks
// metrics, run on a dedicated OS thread so the monotonically-paced sleep is
// never shared with, or delayed by, an async runtime's scheduler. Every
// other collaborator in this crate runs as a tokio task; this is the one
// deliberate exception.
//
// Per-phase failures are caught with `catch_unwind` and logged rather than
// killing the process, the same posture the reconnect loops elsewhere in
// this crate take toward per-iteration errors — the one exception is a
// clock regression, the sole unrecoverable invariant violation, which
// propagates out of `run()`.
// =============================================================================

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::{Clock, Window};
use crate::command::{coalesce, Command};
use crate::config::Config;
use crate::data_hub::DataHub;
use crate::event::Event;
use crate::gates::{self, GateInputs, GateThresholds};
use crate::metrics::{Metrics, RunSummary};
use crate::queues::{CommandQueue, InboundQueue, ENGINE_DRAIN_CEILING};
use crate::snapshot::{
    ControlsBlock, FeedBlock, GatesBlock, InstrumentBlock, LivenessBlock, LoopBlock, QuoteBlock,
    SessionBlock, Snapshot, SCHEMA_VERSION,
};
use crate::types::{EngineRunState, Intent, MdMode};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("monotonic clock went backwards: previous={previous} observed={observed}")]
    ClockRegression { previous: u64, observed: u64 },
}

/// Raw quote fields as last reported by the feed, before per-cycle
/// derivation (staleness_ms, spread_ticks) is computed.
#[derive(Debug, Clone, Default)]
struct RawQuote {
    bid: Option<f64>,
    ask: Option<f64>,
    last: Option<f64>,
    bid_size: Option<u64>,
    ask_size: Option<u64>,
    ts_recv_mono_ns: u64,
    ts_recv_unix_ms: u64,
    ts_exch_unix_ms: Option<u64>,
}

/// All engine-owned mutable state backing the snapshot. Lives only on the
/// Engine thread; nothing outside the Engine mutates it.
struct EngineState {
    feed_connected: bool,
    feed_md_mode: MdMode,
    status_reason_codes: Vec<String>,
    last_status_change_mono_ns: u64,

    last_any_event_mono_ns: u64,
    last_quote_event_mono_ns: u64,
    quotes_received_count: u64,

    quote: Option<RawQuote>,

    intent: Intent,
    arm: bool,
    last_cmd_id: Option<u64>,
    last_cmd_ts_unix_ms: Option<u64>,

    previous_cycle_ms: f64,
    snapshot_id: u64,
    cycle_count: u64,
}

impl EngineState {
    fn new() -> Self {
        Self {
            feed_connected: false,
            feed_md_mode: MdMode::None,
            status_reason_codes: Vec::new(),
            last_status_change_mono_ns: 0,
            last_any_event_mono_ns: 0,
            last_quote_event_mono_ns: 0,
            quotes_received_count: 0,
            quote: None,
            intent: Intent::Flat,
            arm: false,
            last_cmd_id: None,
            last_cmd_ts_unix_ms: None,
            previous_cycle_ms: 0.0,
            snapshot_id: 0,
            cycle_count: 0,
        }
    }
}

/// A cloneable, thread-safe handle used to request shutdown and observe the
/// engine's run state from outside the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    run_state: Arc<AtomicU8>,
}

impl EngineHandle {
    pub fn state(&self) -> EngineRunState {
        EngineRunState::from_u8(self.run_state.load(Ordering::Acquire))
    }

    /// Request a graceful stop. Observed at the top of the next cycle; the
    /// engine finishes the in-flight cycle before returning.
    pub fn stop(&self) {
        self.run_state
            .store(EngineRunState::Stopping as u8, Ordering::Release);
    }
}

pub struct Engine {
    clock: Arc<dyn Clock>,
    inbound: Arc<InboundQueue>,
    commands: Arc<CommandQueue>,
    data_hub: Arc<DataHub>,
    metrics: Arc<Metrics>,

    run_id: String,
    app_version: String,
    config_hash: String,
    instrument: InstrumentBlock,
    operating_window: Window,
    thresholds: GateThresholds,
    cycle_target_ms: u64,
    cycle_overrun_threshold_ms: u64,
    logger_enabled: bool,

    run_state: Arc<AtomicU8>,
    state: EngineState,
    run_start_ts_unix_ms: u64,
}

impl Engine {
    pub fn new(
        config: &Config,
        run_id: String,
        clock: Arc<dyn Clock>,
        inbound: Arc<InboundQueue>,
        commands: Arc<CommandQueue>,
        data_hub: Arc<DataHub>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let operating_window = config
            .operating_window()
            .expect("config validated at load time");
        Self {
            run_start_ts_unix_ms: clock.now_unix_ms(),
            clock,
            inbound,
            commands,
            data_hub,
            metrics,
            run_id,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: config.config_hash(),
            instrument: InstrumentBlock {
                symbol: config.instrument.symbol.clone(),
                contract_key: config.instrument.contract_key.clone(),
                con_id: config.instrument.con_id,
                tick_size: config.instrument.tick_size,
            },
            operating_window,
            thresholds: config.gate_thresholds(),
            cycle_target_ms: config.cycle_target_ms,
            cycle_overrun_threshold_ms: config.cycle_overrun_threshold_ms,
            logger_enabled: config.trigger_logger.enabled,
            run_state: Arc::new(AtomicU8::new(EngineRunState::Idle as u8)),
            state: EngineState::new(),
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            run_state: self.run_state.clone(),
        }
    }

    /// Run the cycle loop until `stop()` is called. Blocking; intended to
    /// be the body of a dedicated OS thread.
    pub fn run(mut self) -> Result<RunSummary, EngineError> {
        self.run_state
            .store(EngineRunState::Running as u8, Ordering::Release);
        info!(run_id = %self.run_id, "engine started");

        let mut last_mono = self.clock.now_mono_ns();

        loop {
            if EngineRunState::from_u8(self.run_state.load(Ordering::Acquire))
                == EngineRunState::Stopping
            {
                break;
            }

            let cycle_start_mono_ns = self.clock.now_mono_ns();
            if cycle_start_mono_ns < last_mono {
                return Err(EngineError::ClockRegression {
                    previous: last_mono,
                    observed: cycle_start_mono_ns,
                });
            }
            last_mono = cycle_start_mono_ns;

            self.state.cycle_count += 1;

            let engine_degraded_this_cycle =
                self.run_one_cycle(cycle_start_mono_ns);

            let cycle_end_mono_ns = self.clock.now_mono_ns();
            let cycle_ms = (cycle_end_mono_ns.saturating_sub(cycle_start_mono_ns)) as f64 / 1e6;
            self.state.previous_cycle_ms = cycle_ms;
            self.metrics.record_cycle(cycle_ms);
            let _ = engine_degraded_this_cycle;

            let sleep_ms = (self.cycle_target_ms as f64 - cycle_ms).max(0.0);
            if sleep_ms > 0.0 {
                std::thread::sleep(std::time::Duration::from_micros((sleep_ms * 1000.0) as u64));
            }
        }

        self.run_state
            .store(EngineRunState::Stopped as u8, Ordering::Release);
        let run_end_ts_unix_ms = self.clock.now_unix_ms();
        let summary = self.metrics.summary(
            &self.run_id,
            self.run_start_ts_unix_ms,
            run_end_ts_unix_ms,
            self.logger_enabled,
        );
        summary.log();
        Ok(summary)
    }

    /// Runs the nine in-cycle phases (phase 10, sleep, is handled by the
    /// caller since it must happen outside any failure guard). Returns
    /// whether this cycle ended up degraded (overrun on the *previous*
    /// cycle, or a caught phase failure this cycle).
    fn run_one_cycle(&mut self, cycle_start_mono_ns: u64) -> bool {
        // Phase 5 precondition: degraded iff the previous cycle overran.
        let mut engine_degraded =
            self.state.previous_cycle_ms > self.cycle_overrun_threshold_ms as f64;

        // Phase 2: event drain.
        let phase_failed = run_guarded("event_drain", || {
            self.drain_events(cycle_start_mono_ns);
        })
        .is_err();
        engine_degraded |= phase_failed;

        // Phase 3: command apply.
        let phase_failed = run_guarded("command_apply", || {
            self.apply_commands();
        })
        .is_err();
        engine_degraded |= phase_failed;

        // Phase 4: derivations (staleness, spread, session).
        let (quote_block, session_block) = match run_guarded("derivations", || {
            self.compute_derivations(cycle_start_mono_ns)
        }) {
            Ok(pair) => pair,
            Err(_) => {
                engine_degraded = true;
                (None, self.fallback_session_block())
            }
        };

        // Phase 6: gate evaluation.
        let inputs = GateInputs {
            arm: self.state.arm,
            intent: self.state.intent,
            in_operating_window: session_block.in_operating_window,
            is_break_window: session_block.is_break_window,
            connected: self.state.feed_connected,
            md_mode: self.state.feed_md_mode,
            con_id: self.instrument.con_id,
            quote_present: quote_block.is_some(),
            staleness_ms: quote_block.as_ref().and_then(|q| q.staleness_ms),
            now_mono_ns: cycle_start_mono_ns,
            last_quote_event_mono_ns: self.state.last_quote_event_mono_ns,
            spread_ticks: quote_block.as_ref().and_then(|q| q.spread_ticks),
            engine_degraded,
            cycle_ms: self.state.previous_cycle_ms,
        };
        let outcome = gates::evaluate(&inputs, &self.thresholds);

        if outcome.reason_codes.iter().any(|r| r == "STALE_DATA") {
            self.metrics.record_staleness_event();
        }

        // Phase 7: snapshot construction.
        self.state.snapshot_id += 1;
        let ts_mono_ns = self.clock.now_mono_ns();
        let ts_unix_ms = self.clock.now_unix_ms();

        let snapshot = Snapshot {
            schema_version: SCHEMA_VERSION,
            app_version: self.app_version.clone(),
            config_hash: self.config_hash.clone(),
            run_id: self.run_id.clone(),
            run_start_ts_unix_ms: self.run_start_ts_unix_ms,
            snapshot_id: self.state.snapshot_id,
            cycle_count: self.state.cycle_count,
            ts_unix_ms,
            ts_mono_ns,
            instrument: self.instrument.clone(),
            feed: FeedBlock {
                connected: self.state.feed_connected,
                md_mode: self.state.feed_md_mode,
                degraded: !self.state.feed_connected || self.state.feed_md_mode != MdMode::Realtime,
                status_reason_codes: self.state.status_reason_codes.clone(),
                last_status_change_mono_ns: self.state.last_status_change_mono_ns,
            },
            liveness: LivenessBlock {
                last_any_event_mono_ns: self.state.last_any_event_mono_ns,
                last_quote_event_mono_ns: self.state.last_quote_event_mono_ns,
                quotes_received_count: self.state.quotes_received_count,
            },
            quote: quote_block,
            session: session_block,
            controls: ControlsBlock {
                intent: self.state.intent,
                arm: self.state.arm,
                last_cmd_id: self.state.last_cmd_id,
                last_cmd_ts_unix_ms: self.state.last_cmd_ts_unix_ms,
            },
            loop_health: LoopBlock {
                cycle_ms: self.state.previous_cycle_ms,
                cycle_overrun: self.state.previous_cycle_ms
                    > self.cycle_overrun_threshold_ms as f64,
                engine_degraded,
                last_cycle_start_mono_ns: cycle_start_mono_ns,
            },
            gates: GatesBlock {
                allowed: outcome.allowed,
                reason_codes: outcome.reason_codes.clone(),
                gate_metrics: outcome.gate_metrics,
            },
            ready: outcome.allowed,
            ready_reasons: outcome.reason_codes,
        };

        // Phase 8: publish.
        self.data_hub.publish(snapshot);

        engine_degraded
    }

    fn drain_events(&mut self, cycle_start_mono_ns: u64) {
        let events = self.inbound.drain(Some(ENGINE_DRAIN_CEILING));
        for event in events {
            self.state.last_any_event_mono_ns = event.mono_ns();
            match event {
                Event::Status {
                    connected,
                    md_mode,
                    reason,
                    mono_ns,
                    ..
                } => {
                    if !self.state.feed_connected && connected {
                        self.metrics.record_reconnect();
                    }
                    self.state.feed_connected = connected;
                    self.state.feed_md_mode = md_mode;
                    self.state.last_status_change_mono_ns = mono_ns;
                    if let Some(reason) = reason {
                        self.state.status_reason_codes.push(reason);
                    }
                }
                Event::Quote {
                    bid,
                    ask,
                    last,
                    bid_size,
                    ask_size,
                    ts_recv_mono_ns,
                    ts_recv_unix_ms,
                    ts_exch_unix_ms,
                } => {
                    self.state.quote = Some(RawQuote {
                        bid,
                        ask,
                        last,
                        bid_size,
                        ask_size,
                        ts_recv_mono_ns,
                        ts_recv_unix_ms,
                        ts_exch_unix_ms,
                    });
                    self.state.last_quote_event_mono_ns = ts_recv_mono_ns;
                    self.state.quotes_received_count += 1;
                    self.metrics.record_quote_received();
                }
                Event::AdapterError { code, message, .. } => {
                    warn!(code, message = %message, "adapter error event");
                    self.state
                        .status_reason_codes
                        .push(format!("ADAPTER_ERROR_{code}"));
                }
            }
        }
        let _ = cycle_start_mono_ns;
    }

    fn apply_commands(&mut self) {
        let pending: Vec<Command> = self.commands.drain_all();
        let coalesced = coalesce(&pending);
        if let Some(intent) = coalesced.intent {
            self.state.intent = intent;
        }
        if let Some(arm) = coalesced.arm {
            self.state.arm = arm;
        }
        if let Some(id) = coalesced.last_cmd_id {
            self.state.last_cmd_id = Some(id);
            self.state.last_cmd_ts_unix_ms = coalesced.last_cmd_ts_unix_ms;
        }
    }

    fn compute_derivations(
        &self,
        cycle_start_mono_ns: u64,
    ) -> (Option<QuoteBlock>, SessionBlock) {
        let quote_block = self.state.quote.as_ref().map(|q| {
            let staleness_ms = (cycle_start_mono_ns.saturating_sub(q.ts_recv_mono_ns)) as f64
                / 1e6;
            let spread_ticks = Snapshot::spread_ticks(q.bid, q.ask, self.instrument.tick_size);
            QuoteBlock {
                bid: q.bid,
                ask: q.ask,
                last: q.last,
                bid_size: q.bid_size,
                ask_size: q.ask_size,
                ts_recv_mono_ns: q.ts_recv_mono_ns,
                ts_recv_unix_ms: q.ts_recv_unix_ms,
                ts_exch_unix_ms: q.ts_exch_unix_ms,
                staleness_ms: Some(staleness_ms.max(0.0)),
                spread_ticks,
            }
        });

        let session_block = SessionBlock {
            in_operating_window: self.clock.in_operating_window(self.operating_window),
            is_break_window: self.clock.is_break_window(),
            session_date_iso: self.clock.session_date_iso(),
        };

        (quote_block, session_block)
    }

    fn fallback_session_block(&self) -> SessionBlock {
        SessionBlock {
            in_operating_window: false,
            is_break_window: false,
            session_date_iso: self.clock.session_date_iso(),
        }
    }
}

/// Run `f`, catching any panic and logging it as a degraded phase rather
/// than letting it tear down the engine thread. The closure must only
/// commit state via its return value —
/// no partial mutation through captured `&mut self` before a potential
/// panic — which is why every phase above is expressed as either a
/// self-contained mutator (drain_events/apply_commands, each idempotent
/// per event) or a pure computation (compute_derivations).
fn run_guarded<F, T>(phase: &str, f: F) -> Result<T, ()>
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(_) => {
            error!(phase, "engine phase panicked — cycle marked degraded");
            Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::command::CommandKind;

    fn test_config() -> Config {
        let mut cfg = Config::default();
        cfg.instrument.con_id = Some(42);
        cfg
    }

    fn build_engine(
        clock: Arc<FrozenClock>,
    ) -> (
        Engine,
        Arc<InboundQueue>,
        Arc<CommandQueue>,
        Arc<DataHub>,
        Arc<Metrics>,
    ) {
        let cfg = test_config();
        let inbound = Arc::new(InboundQueue::new(cfg.inbound_queue_capacity));
        let commands = Arc::new(CommandQueue::new(cfg.command_queue_capacity));
        let data_hub = Arc::new(DataHub::new());
        let metrics = Arc::new(Metrics::new());
        let engine = Engine::new(
            &cfg,
            "test-run".to_string(),
            clock,
            inbound.clone(),
            commands.clone(),
            data_hub.clone(),
            metrics.clone(),
        );
        (engine, inbound, commands, data_hub, metrics)
    }

    #[test]
    fn snapshot_ids_increase_strictly_from_one() {
        let clock = Arc::new(FrozenClock::new(0, 0));
        let (mut engine, _inbound, _commands, data_hub, _metrics) = build_engine(clock.clone());

        for _ in 0..5 {
            clock.advance_mono_ns(1_000_000);
            engine.run_one_cycle(clock.now_mono_ns());
        }

        let snap = data_hub.latest().unwrap();
        assert_eq!(snap.snapshot_id, 5);
        assert_eq!(snap.cycle_count, 0); // cycle_count is bumped in run(), not run_one_cycle directly
    }

    #[test]
    fn ready_mirrors_allowed_and_reason_codes() {
        let clock = Arc::new(FrozenClock::new(0, 0));
        let (mut engine, _inbound, _commands, data_hub, _metrics) = build_engine(clock.clone());
        engine.run_one_cycle(clock.now_mono_ns());
        let snap = data_hub.latest().unwrap();
        assert_eq!(snap.ready, snap.gates.allowed);
        assert_eq!(snap.ready_reasons, snap.gates.reason_codes);
        // Nothing armed yet -> ARM_OFF and INTENT_FLAT at minimum.
        assert!(snap.gates.reason_codes.contains(&"ARM_OFF".to_string()));
    }

    #[test]
    fn coalesced_commands_reflected_by_next_cycle() {
        let clock = Arc::new(FrozenClock::new(0, 0));
        let (mut engine, _inbound, commands, data_hub, _metrics) = build_engine(clock.clone());
        let sender = commands.sender();
        sender
            .push(Command {
                id: 1,
                ts_unix_ms: 10,
                kind: CommandKind::SetIntent(Intent::Long),
            })
            .unwrap();
        sender
            .push(Command {
                id: 2,
                ts_unix_ms: 20,
                kind: CommandKind::SetArm(true),
            })
            .unwrap();
        sender
            .push(Command {
                id: 3,
                ts_unix_ms: 30,
                kind: CommandKind::SetIntent(Intent::Flat),
            })
            .unwrap();

        engine.run_one_cycle(clock.now_mono_ns());
        let snap = data_hub.latest().unwrap();
        assert_eq!(snap.controls.intent, Intent::Flat);
        assert!(snap.controls.arm);
        assert_eq!(snap.controls.last_cmd_id, Some(3));
    }

    #[test]
    fn quote_event_drives_spread_and_staleness() {
        let clock = Arc::new(FrozenClock::new(0, 1_000_000_000));
        let (mut engine, inbound, _commands, data_hub, _metrics) = build_engine(clock.clone());
        let sender = inbound.sender();
        sender
            .push(Event::Quote {
                bid: Some(18499.75),
                ask: Some(18500.00),
                last: Some(18499.75),
                bid_size: Some(10),
                ask_size: Some(5),
                ts_recv_mono_ns: 999_000_000,
                ts_recv_unix_ms: 0,
                ts_exch_unix_ms: None,
            })
            .unwrap();
        sender
            .push(Event::Status {
                connected: true,
                md_mode: MdMode::Realtime,
                reason: None,
                mono_ns: 999_000_000,
                unix_ms: 0,
            })
            .unwrap();

        engine.run_one_cycle(clock.now_mono_ns());
        let snap = data_hub.latest().unwrap();
        let quote = snap.quote.unwrap();
        assert_eq!(quote.spread_ticks, Some(1));
        assert!(quote.staleness_ms.unwrap() >= 0.0);
    }

    #[test]
    fn disconnect_to_connect_transition_counts_reconnect() {
        let clock = Arc::new(FrozenClock::new(0, 0));
        let (mut engine, inbound, _commands, data_hub, metrics) = build_engine(clock.clone());
        let sender = inbound.sender();
        sender
            .push(Event::Status {
                connected: true,
                md_mode: MdMode::Realtime,
                reason: None,
                mono_ns: 0,
                unix_ms: 0,
            })
            .unwrap();
        engine.run_one_cycle(clock.now_mono_ns());

        // The engine starts disconnected by default, so this one transition
        // (false -> true) should have been counted as a reconnect.
        let summary = metrics.summary("test-run", 0, 0, true);
        assert_eq!(summary.reconnect_count, 1);
        let snap = data_hub.latest().unwrap();
        assert!(snap.feed.connected);
    }
}
