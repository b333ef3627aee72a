// =============================================================================
// Silent Observer — Main Entry Point
// =============================================================================
//
// The kernel never places an order and never terminates on its own short of
// a clock regression or an explicit shutdown signal — it ingests, gates,
// publishes, and logs. Engine runs on a dedicated OS thread so its 10 Hz
// cycle loop is never at the mercy of the tokio scheduler; every other
// collaborator (the synthetic feed stand-in, the trigger logger, the status
// API) is an ordinary tokio task, spawned once here and left running.
// =============================================================================

mod adapter;
mod api;
mod clock;
mod command;
mod config;
mod data_hub;
mod engine;
mod event;
mod gates;
mod metrics;
mod queues;
mod snapshot;
mod trigger_logger;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use adapter::SyntheticAdapter;
use api::ApiState;
use clock::SystemClock;
use config::Config;
use data_hub::DataHub;
use engine::Engine;
use metrics::Metrics;
use queues::{CommandQueue, InboundQueue};
use trigger_logger::TriggerLogger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("silent observer starting up");

    let config_path = std::env::var("SO_CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("fatal configuration error loading {config_path}"))?;
    config.apply_env_overrides();

    info!(
        symbol = %config.instrument.symbol,
        contract_key = %config.instrument.contract_key,
        "config loaded"
    );

    // ── 2. Shared infrastructure ──────────────────────────────────────────
    let run_id = uuid::Uuid::new_v4().to_string();
    let clock: Arc<dyn clock::Clock> = Arc::new(SystemClock::new());
    let data_hub = Arc::new(DataHub::new());
    let inbound = Arc::new(InboundQueue::new(config.inbound_queue_capacity));
    let commands = Arc::new(CommandQueue::new(config.command_queue_capacity));
    let metrics = Arc::new(Metrics::new());

    let run_start_ts_unix_ms = clock.now_unix_ms();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // ── 3. Synthetic feed adapter ──────────────────────────────────────────
    let adapter = SyntheticAdapter::new(
        inbound.sender(),
        clock.clone(),
        config.instrument.tick_size,
        config.instrument.tick_size * 4000.0,
    );
    let adapter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        adapter.run(adapter_shutdown).await;
    });

    // ── 4. Engine — dedicated OS thread ────────────────────────────────────
    let engine = Engine::new(
        &config,
        run_id.clone(),
        clock.clone(),
        inbound.clone(),
        commands.clone(),
        data_hub.clone(),
        metrics.clone(),
    );
    let engine_handle = engine.handle();
    let engine_join = std::thread::Builder::new()
        .name("engine-cycle-loop".to_string())
        .spawn(move || engine.run())
        .expect("failed to spawn engine thread");

    // ── 5. Trigger logger ───────────────────────────────────────────────────
    let trigger_logger = TriggerLogger::new(config.trigger_logger.clone(), run_id.clone(), clock.clone());
    let logger_data_hub = data_hub.clone();
    let logger_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        trigger_logger.run(logger_data_hub, logger_shutdown).await;
    });

    // ── 6. Status API ────────────────────────────────────────────────────────
    let api_state = Arc::new(ApiState::new(
        data_hub.clone(),
        commands.sender(),
        metrics.clone(),
        run_id.clone(),
        run_start_ts_unix_ms,
        &config,
    ));
    let bind_addr = std::env::var("SO_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:7878".to_string());
    let bind_addr_clone = bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("failed to bind status API server");
        info!(addr = %bind_addr_clone, "status API listening");
        axum::serve(listener, app).await.expect("status API server failed");
    });

    info!(run_id = %run_id, "all subsystems running — press Ctrl+C to stop");

    // ── 7. Shutdown: Ctrl+C or an optional bounded runtime ──────────────────
    let max_runtime = config
        .max_runtime_s
        .map(|s| tokio::time::sleep(tokio::time::Duration::from_secs(s)));

    match max_runtime {
        Some(sleep) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!("shutdown signal received — stopping gracefully");
                }
                _ = sleep => {
                    info!("configured max_runtime_s elapsed — stopping gracefully");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            warn!("shutdown signal received — stopping gracefully");
        }
    }

    let _ = shutdown_tx.send(true);
    engine_handle.stop();

    let outcome = tokio::task::spawn_blocking(move || engine_join.join()).await;
    let fatal = match outcome {
        Ok(Ok(Ok(summary))) => {
            info!(
                run_id = %summary.run_id,
                cycle_count = summary.cycle_count,
                reconnect_count = summary.reconnect_count,
                "engine stopped cleanly"
            );
            false
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "engine stopped due to a fatal error");
            true
        }
        Ok(Err(_)) => {
            error!("engine thread panicked");
            true
        }
        Err(e) => {
            error!(error = %e, "failed to join engine thread");
            true
        }
    };

    info!("silent observer shut down complete");
    if fatal {
        anyhow::bail!("engine did not stop cleanly");
    }
    Ok(())
}
