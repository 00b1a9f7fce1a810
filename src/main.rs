mod config;
mod coordinator;
mod domain;
mod engine;
mod events;
mod ids;
mod scheduler;
mod storage;
mod venues;

use std::env;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use config::Config;
use coordinator::ExchangeCoordinator;
use engine::ArbitrageEngine;
use events::{Event, EventBus, EventKind, Handler};
use scheduler::run_periodic;
use storage::{SqliteStorage, SqliteStorageConfig, Storage};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_config_path();
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return;
        }
    };

    init_tracing(config.app.log_level.as_deref());
    info!(config = %config_path, app = %config.app.name, "starting");

    let mut storage_config = SqliteStorageConfig::default();
    if let Some(section) = &config.storage {
        if let Some(path) = &section.path {
            storage_config.path = path.clone();
        }
        if let Some(max_connections) = section.max_connections {
            storage_config.max_connections = max_connections;
        }
    }
    let storage: Arc<dyn Storage> = match SqliteStorage::new(storage_config).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!(error = %e, "Failed to initialize storage");
            return;
        }
    };

    let venues = match venues::from_config(&config) {
        Ok(venues) => venues,
        Err(e) => {
            error!(error = %e, "Failed to build venue connectors");
            return;
        }
    };

    let pairs = match config.trade_pairs() {
        Ok(pairs) => pairs,
        Err(e) => {
            error!(error = %e, "Failed to parse trading pairs");
            return;
        }
    };

    let bus = Arc::new(EventBus::new());
    let coordinator = Arc::new(ExchangeCoordinator::new(
        venues,
        storage.clone(),
        bus.clone(),
        pairs,
        config.arbitrage.request_timeout(),
    ));
    let engine = Arc::new(ArbitrageEngine::new(
        coordinator.clone(),
        storage.clone(),
        bus.clone(),
        config.arbitrage.clone(),
    ));

    // Detected opportunities are executed; filled legs are settled.
    let process_engine = engine.clone();
    let process_handler: Handler = Arc::new(move |event| {
        let engine = process_engine.clone();
        Box::pin(async move {
            if let Event::OpportunityDetected(opportunity) = event {
                engine.process(&opportunity).await?;
            }
            Ok(())
        })
    });
    bus.subscribe(EventKind::OpportunityDetected, process_handler)
        .await;

    let settle_engine = engine.clone();
    let settle_handler: Handler = Arc::new(move |event| {
        let engine = settle_engine.clone();
        Box::pin(async move {
            if let Event::OrderFilled(order) = event {
                engine.make_transfer(&order).await?;
            }
            Ok(())
        })
    });
    bus.subscribe(EventKind::OrderFilled, settle_handler).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let scan_engine = engine.clone();
    let scan_task = tokio::spawn(run_periodic(
        "scan",
        config.arbitrage.scan_interval(),
        shutdown_rx.clone(),
        move || {
            let engine = scan_engine.clone();
            async move { engine.scan().await }
        },
    ));

    let reconcile_coordinator = coordinator.clone();
    let reconcile_task = tokio::spawn(run_periodic(
        "reconcile",
        config.arbitrage.reconcile_interval(),
        shutdown_rx,
        move || {
            let coordinator = reconcile_coordinator.clone();
            async move { coordinator.reconcile_open_orders().await }
        },
    ));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    let _ = shutdown_tx.send(());
    let _ = tokio::join!(scan_task, reconcile_task);

    if let Err(e) = storage.close().await {
        error!(error = %e, "Failed to close storage");
    }
    info!("stopped");
}
