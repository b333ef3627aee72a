// =============================================================================
// TriggerLogger — crash-tolerant JSONL audit trail
// =============================================================================
//
// A background tokio task, not the Engine thread: it only ever reads the
// latest published snapshot off the DataHub, so a slow or wedged disk can
// never back-pressure the cycle loop. Append-only, one record per tick at
// `cadence_hz`, with an explicit `flush()` every `flush_interval_records` so
// a crash loses at most a few seconds of records rather than corrupting the
// file. A write failure is logged and the loop carries on rather than
// tearing down the task over a transient disk error.
// =============================================================================

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::TriggerLoggerConfig;
use crate::data_hub::DataHub;
use crate::snapshot::Snapshot;
use crate::types::{Intent, MdMode};

#[derive(Debug, Error)]
pub enum LogWriteError {
    #[error("failed to open trigger log file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write trigger card: {0}")]
    Write(#[source] std::io::Error),
}

/// Flattened mirror of the `gate_metrics` keys named in spec §4.5, carried
/// on every trigger card alongside the gate verdict itself.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerCardGateMetrics {
    pub staleness_ms: Option<f64>,
    pub spread_ticks: Option<u64>,
    pub md_mode: MdMode,
    pub connected: bool,
    pub in_operating_window: bool,
    pub is_break_window: bool,
    pub engine_degraded: bool,
    pub cycle_ms: f64,
}

/// One appended record. `triggercard.v1` names the wire schema, distinct
/// from (but versioned alongside) `snapshot.v1`. This kernel never places
/// orders, so `action_taken` is always `"NONE"` and `action_id` always
/// `null` — the fields exist so a downstream log format shared with an
/// order-capable sibling system stays structurally compatible.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerCard<'a> {
    pub schema_version: &'static str,
    pub app_version: &'a str,
    pub config_hash: &'a str,
    pub run_id: &'a str,
    pub seq: u64,
    pub snapshot_id: u64,
    pub log_ts_unix_ms: u64,
    pub log_ts_mono_ns: u64,
    pub symbol: &'a str,
    pub contract_key: &'a str,
    pub intent: Intent,
    pub arm: bool,
    pub allowed: bool,
    pub reason_codes: &'a [String],
    pub gate_metrics: TriggerCardGateMetrics,
    pub action_taken: &'static str,
    pub action_id: Option<u64>,
}

const TRIGGER_CARD_SCHEMA_VERSION: &str = "triggercard.v1";

impl<'a> TriggerCard<'a> {
    fn from_snapshot(snapshot: &'a Snapshot, seq: u64, log_ts_unix_ms: u64, log_ts_mono_ns: u64) -> Self {
        Self {
            schema_version: TRIGGER_CARD_SCHEMA_VERSION,
            app_version: &snapshot.app_version,
            config_hash: &snapshot.config_hash,
            run_id: &snapshot.run_id,
            seq,
            snapshot_id: snapshot.snapshot_id,
            log_ts_unix_ms,
            log_ts_mono_ns,
            symbol: &snapshot.instrument.symbol,
            contract_key: &snapshot.instrument.contract_key,
            intent: snapshot.controls.intent,
            arm: snapshot.controls.arm,
            allowed: snapshot.ready,
            reason_codes: &snapshot.ready_reasons,
            gate_metrics: TriggerCardGateMetrics {
                staleness_ms: snapshot.gates.gate_metrics.staleness_ms,
                spread_ticks: snapshot.gates.gate_metrics.spread_ticks,
                md_mode: snapshot.gates.gate_metrics.md_mode,
                connected: snapshot.gates.gate_metrics.connected,
                in_operating_window: snapshot.gates.gate_metrics.in_operating_window,
                is_break_window: snapshot.gates.gate_metrics.is_break_window,
                engine_degraded: snapshot.gates.gate_metrics.engine_degraded,
                cycle_ms: snapshot.gates.gate_metrics.cycle_ms,
            },
            action_taken: "NONE",
            action_id: None,
        }
    }
}

/// Appends one `TriggerCard` per tick to a rotating JSONL file.
pub struct TriggerLogger {
    config: TriggerLoggerConfig,
    run_id: String,
    clock: Arc<dyn Clock>,
    file: Option<File>,
    file_path: Option<PathBuf>,
    unflushed_records: u64,
    seq: u64,
}

impl TriggerLogger {
    pub fn new(config: TriggerLoggerConfig, run_id: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            run_id,
            clock,
            file: None,
            file_path: None,
            unflushed_records: 0,
            seq: 0,
        }
    }

    /// File name convention: `triggercard_{YYYYMMDD}_{run_id}.jsonl`, so a
    /// restart or a date rollover always opens (or resumes appending to) a
    /// distinct file rather than truncating one in progress.
    fn file_path_for(&self, session_date_iso: &str) -> PathBuf {
        let date_compact = session_date_iso.replace('-', "");
        PathBuf::from(&self.config.directory)
            .join(format!("triggercard_{date_compact}_{}.jsonl", self.run_id))
    }

    fn ensure_open(&mut self, session_date_iso: &str) -> Result<(), LogWriteError> {
        let wanted = self.file_path_for(session_date_iso);
        if self.file_path.as_ref() == Some(&wanted) && self.file.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.config.directory).map_err(|source| LogWriteError::Open {
            path: wanted.display().to_string(),
            source,
        })?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wanted)
            .map_err(|source| LogWriteError::Open {
                path: wanted.display().to_string(),
                source,
            })?;

        info!(path = %wanted.display(), "trigger log file opened");
        self.file = Some(file);
        self.file_path = Some(wanted);
        self.unflushed_records = 0;
        Ok(())
    }

    fn append(&mut self, snapshot: &Snapshot) -> Result<(), LogWriteError> {
        self.ensure_open(&snapshot.session.session_date_iso)?;
        self.seq += 1;
        let card = TriggerCard::from_snapshot(
            snapshot,
            self.seq,
            self.clock.now_unix_ms(),
            self.clock.now_mono_ns(),
        );
        let mut line = serde_json::to_vec(&card).map_err(|e| {
            LogWriteError::Write(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        line.push(b'\n');

        let file = self.file.as_mut().expect("ensure_open just set it");
        file.write_all(&line).map_err(LogWriteError::Write)?;
        self.unflushed_records += 1;

        if self.unflushed_records >= self.config.flush_interval_records {
            file.flush().map_err(LogWriteError::Write)?;
            self.unflushed_records = 0;
        }
        Ok(())
    }

    /// Run the fixed-cadence append loop until cancelled. Intended to be
    /// spawned as its own tokio task; failures to write are logged and the
    /// loop continues rather than terminating the process, since a wedged
    /// disk must never take down the observing kernel.
    pub async fn run(mut self, data_hub: Arc<DataHub>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("trigger logger disabled by config");
            return;
        }

        let period_ms = (1000.0 / self.config.cadence_hz.max(0.001)).round().max(1.0) as u64;
        let mut ticker = interval(Duration::from_millis(period_ms));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(snapshot) = data_hub.latest() else { continue };
                    if let Err(e) = self.append(&snapshot) {
                        warn!(error = %e, "failed to append trigger card — will retry next tick");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                error!(error = %e, "final trigger log flush failed");
            }
        }
        info!("trigger logger stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::snapshot::{
        ControlsBlock, FeedBlock, GateMetrics, GatesBlock, InstrumentBlock, LivenessBlock,
        LoopBlock, SessionBlock, SCHEMA_VERSION,
    };
    use crate::types::{Intent, MdMode};

    fn test_clock() -> Arc<dyn Clock> {
        Arc::new(FrozenClock::new(0, 0))
    }

    fn snapshot_with_id(id: u64, session_date_iso: &str) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION,
            app_version: "test".into(),
            config_hash: "hash".into(),
            run_id: "run-1".into(),
            run_start_ts_unix_ms: 0,
            snapshot_id: id,
            cycle_count: id,
            ts_unix_ms: id * 100,
            ts_mono_ns: id * 100_000_000,
            instrument: InstrumentBlock {
                symbol: "ES".into(),
                contract_key: "ES.202609".into(),
                con_id: Some(1),
                tick_size: 0.25,
            },
            feed: FeedBlock {
                connected: true,
                md_mode: MdMode::Realtime,
                degraded: false,
                status_reason_codes: vec![],
                last_status_change_mono_ns: 0,
            },
            liveness: LivenessBlock {
                last_any_event_mono_ns: 0,
                last_quote_event_mono_ns: 0,
                quotes_received_count: 0,
            },
            quote: None,
            session: SessionBlock {
                in_operating_window: true,
                is_break_window: false,
                session_date_iso: session_date_iso.to_string(),
            },
            controls: ControlsBlock {
                intent: Intent::Flat,
                arm: false,
                last_cmd_id: None,
                last_cmd_ts_unix_ms: None,
            },
            loop_health: LoopBlock {
                cycle_ms: 1.0,
                cycle_overrun: false,
                engine_degraded: false,
                last_cycle_start_mono_ns: 0,
            },
            gates: GatesBlock {
                allowed: false,
                reason_codes: vec!["ARM_OFF".into()],
                gate_metrics: GateMetrics::default(),
            },
            ready: false,
            ready_reasons: vec!["ARM_OFF".into()],
        }
    }

    fn temp_dir(tag: &str) -> String {
        let dir = std::env::temp_dir().join(format!("silent-observer-test-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir.to_string_lossy().to_string()
    }

    #[test]
    fn append_creates_file_and_writes_one_jsonl_line_per_card() {
        let dir = temp_dir("append");
        let config = TriggerLoggerConfig {
            enabled: true,
            cadence_hz: 1.0,
            directory: dir.clone(),
            flush_interval_records: 1,
        };
        let mut logger = TriggerLogger::new(config, "run-1".to_string(), test_clock());
        let snap = snapshot_with_id(1, "2026-07-28");
        logger.append(&snap).unwrap();
        logger.append(&snapshot_with_id(2, "2026-07-28")).unwrap();

        let path = logger.file_path_for("2026-07-28");
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for (i, line) in lines.iter().enumerate() {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["schema_version"], "triggercard.v1");
            assert_eq!(parsed["action_taken"], "NONE");
            assert!(parsed["action_id"].is_null());
            assert_eq!(parsed["seq"], (i + 1) as u64);
            assert!(parsed["gate_metrics"]["connected"].is_boolean());
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn session_date_rollover_opens_a_new_file() {
        let dir = temp_dir("rollover");
        let config = TriggerLoggerConfig {
            enabled: true,
            cadence_hz: 1.0,
            directory: dir.clone(),
            flush_interval_records: 1,
        };
        let mut logger = TriggerLogger::new(config, "run-1".to_string(), test_clock());
        logger.append(&snapshot_with_id(1, "2026-07-28")).unwrap();
        let path_day1 = logger.file_path_for("2026-07-28");
        logger.append(&snapshot_with_id(2, "2026-07-29")).unwrap();
        let path_day2 = logger.file_path_for("2026-07-29");

        assert_ne!(path_day1, path_day2);
        assert!(path_day1.exists());
        assert!(path_day2.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_name_embeds_compact_date_and_run_id() {
        let config = TriggerLoggerConfig {
            enabled: true,
            cadence_hz: 1.0,
            directory: "./trigger_logs".to_string(),
            flush_interval_records: 10,
        };
        let logger = TriggerLogger::new(config, "abc123".to_string(), test_clock());
        let path = logger.file_path_for("2026-07-28");
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "triggercard_20260728_abc123.jsonl"
        );
    }
}
