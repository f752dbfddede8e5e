//! Execution core binary.
//!
//! Loads config, opens the store, wires the engine behind its collaborators
//! and runs the reconciliation loop until shutdown. Trade decisions arrive
//! through the library API; this process keeps the books honest in between.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use execution_core::broker::alpaca::AlpacaBroker;
use execution_core::broker::BrokerPort;
use execution_core::notify::{NoOpNotifier, NotifierPort, TelegramNotifier};
use execution_core::safety::SafetyGate;
use execution_core::{Config, ExecutionEngine, Reconciler, Store, TradingCircuitBreakers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,execution_core=debug")),
        )
        .init();

    let config_path =
        std::env::var("EXECUTION_CORE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).with_context(|| format!("loading {config_path}"))?
    } else {
        warn!(path = %config_path, "config file not found; using defaults");
        Config::default()
    };

    if let Some(dir) = Path::new(&config.persistence.db_path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    let store = Store::open(&config.persistence.db_path)
        .await
        .context("opening store")?;
    info!(db_path = %config.persistence.db_path, "store ready");

    let broker: Arc<dyn BrokerPort> =
        Arc::new(AlpacaBroker::new(config.broker.clone()).context("building broker adapter")?);
    let notifier: Arc<dyn NotifierPort> = match TelegramNotifier::from_config(&config.notify) {
        Some(telegram) => Arc::new(telegram),
        None => {
            info!("notifications disabled");
            Arc::new(NoOpNotifier)
        }
    };

    let breakers = TradingCircuitBreakers::new(
        store.clone(),
        config.breakers.clone(),
        config.market.clone(),
    );
    let gate = SafetyGate::new(
        store.clone(),
        Arc::clone(&broker),
        breakers.clone(),
        config.trading.clone(),
        config.market.clone(),
    );
    let engine = ExecutionEngine::new(
        store.clone(),
        Arc::clone(&broker),
        Arc::clone(&notifier),
        gate,
        breakers,
        config.trading.clone(),
        config.execution.clone(),
    );
    let reconciler = Reconciler::new(
        store,
        Arc::clone(&broker),
        Arc::clone(&notifier),
        config.reconcile.clone(),
    );

    match engine.breaker_status().await {
        Ok(state) if state.tripped => warn!(reason = %state.reason, "starting with a tripped breaker"),
        Ok(_) => info!("breakers clear"),
        Err(e) => warn!(error = %e, "could not read breaker status at startup"),
    }

    info!(
        interval_secs = config.reconcile.interval_secs,
        "entering reconciliation loop"
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(config.reconcile.interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match reconciler.run_once().await {
                    Ok((order_report, position_report)) => {
                        info!(
                            orders_checked = order_report.checked,
                            fills_applied = order_report.fills_applied,
                            orphans_adopted = position_report.orphans_adopted,
                            phantoms_closed = position_report.phantoms_closed,
                            "reconcile pass complete"
                        );
                    }
                    // A failed pass is retried on the next tick; local state
                    // is never mutated from a partial view.
                    Err(e) => error!(error = %e, "reconcile pass failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
