// =============================================================================
// StatusApi — read-only snapshot/summary surface + the one command inlet
// =============================================================================
//
// Mounted under `/api/v1/`. There is deliberately no authentication layer
// here: this kernel places no orders and the API exposes nothing but the
// already-public admission state plus a narrow command inlet, so there is
// no trading-control surface here that would need a bearer-token gate
// (noted in DESIGN.md).
// =============================================================================

pub mod rest;
pub mod ws;

use std::sync::Arc;

use crate::config::Config;
use crate::data_hub::DataHub;
use crate::metrics::Metrics;
use crate::queues::CommandSender;

/// Shared state for every StatusApi handler, scoped to what this kernel
/// actually exposes.
pub struct ApiState {
    pub data_hub: Arc<DataHub>,
    pub commands: CommandSender,
    pub metrics: Arc<Metrics>,
    pub run_id: String,
    pub run_start_ts_unix_ms: u64,
    pub logger_enabled: bool,
}

impl ApiState {
    pub fn new(
        data_hub: Arc<DataHub>,
        commands: CommandSender,
        metrics: Arc<Metrics>,
        run_id: String,
        run_start_ts_unix_ms: u64,
        config: &Config,
    ) -> Self {
        Self {
            data_hub,
            commands,
            metrics,
            run_id,
            run_start_ts_unix_ms,
            logger_enabled: config.trigger_logger.enabled,
        }
    }
}
