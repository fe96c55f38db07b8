//! SMS gateway dev server
//!
//! All-in-one binary for local development containing:
//! - HTTP API (submit + query endpoints)
//! - Embedded SQLite store and dispatch queue
//! - Delivery worker with a simulated carrier gateway
//! - Prometheus metrics endpoint

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Router};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use sms_api::{create_router, ApiState, MessageService};
use sms_dispatch::{DeliveryWorker, DeliveryWorkerConfig, MessageProducer, SimulatedGateway};
use sms_queue::{EmbeddedJobQueue, JobConsumer, SqliteJobQueue};
use sms_store::SqliteMessageStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// SMS Gateway Development Server
#[derive(Parser, Debug)]
#[command(name = "sms-server")]
#[command(about = "SMS gateway dev server - all components in one binary")]
struct Args {
    /// API server port
    #[arg(long, env = "SMS_API_PORT", default_value = "8080")]
    api_port: u16,

    /// Metrics server port
    #[arg(long, env = "SMS_METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// SQLite database URL ("sqlite::memory:" keeps everything in-process)
    #[arg(long, env = "SMS_DATABASE_URL", default_value = "sqlite::memory:")]
    database_url: String,

    /// Delivery worker concurrency
    #[arg(long, env = "SMS_WORKER_CONCURRENCY", default_value = "4")]
    worker_concurrency: usize,

    /// Worker poll interval in milliseconds
    #[arg(long, env = "SMS_WORKER_POLL_INTERVAL_MS", default_value = "250")]
    worker_poll_interval_ms: u64,

    /// Queue visibility timeout in seconds
    #[arg(long, env = "SMS_QUEUE_VISIBILITY_TIMEOUT", default_value = "30")]
    queue_visibility_timeout: u32,

    /// Simulated carrier success rate (0.0 - 1.0)
    #[arg(long, env = "SMS_GATEWAY_SUCCESS_RATE", default_value = "0.8")]
    gateway_success_rate: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    sms_common::logging::init_logging("sms-server");

    let args = Args::parse();

    info!("Starting SMS gateway dev server");
    info!("API port: {}, Metrics port: {}", args.api_port, args.metrics_port);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Prometheus recorder backing the metrics facade
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;

    // 1. SQLite pool shared by the store and the embedded queue.
    // An in-memory database exists per connection, so it must be pinned to
    // a single connection to stay coherent.
    let in_memory = args.database_url.ends_with(":memory:");
    let connect_options = SqliteConnectOptions::from_str(&args.database_url)?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .connect_with(connect_options)
        .await?;

    // 2. Message store
    let store = Arc::new(SqliteMessageStore::new(pool.clone()));
    store.init_schema().await?;
    info!("Message store initialized");

    // 3. Embedded dispatch queue
    let queue = Arc::new(SqliteJobQueue::new(
        pool.clone(),
        "sms-dispatch".to_string(),
        args.queue_visibility_timeout,
    ));
    queue.init_schema().await?;
    info!("Embedded dispatch queue initialized");

    // 4. Simulated carrier gateway
    let gateway = Arc::new(SimulatedGateway::with_config(
        args.gateway_success_rate,
        100..500,
    ));

    // 5. Delivery worker
    let worker = Arc::new(DeliveryWorker::new(
        store.clone(),
        queue.clone(),
        gateway,
        DeliveryWorkerConfig {
            concurrency: args.worker_concurrency,
            poll_interval: Duration::from_millis(args.worker_poll_interval_ms),
            ..DeliveryWorkerConfig::default()
        },
    ));

    let worker_handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    // 6. Producer + service + API server
    let producer = Arc::new(MessageProducer::new(store.clone(), queue.clone()));
    let service = Arc::new(MessageService::new(store.clone(), producer));

    let api_app = create_router(ApiState { service })
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let api_addr = format!("0.0.0.0:{}", args.api_port);
    info!("API server listening on http://{}", api_addr);

    let api_listener = TcpListener::bind(&api_addr).await?;
    let api_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let server = axum::serve(api_listener, api_app);
            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!("API server error: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("API server shutting down");
                }
            }
        })
    };

    // 7. Metrics server
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    info!("Metrics server listening on http://{}/metrics", metrics_addr);

    let metrics_app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let handle = prometheus_handle.clone();
                async move { handle.render() }
            }),
        )
        .route("/health", get(|| async { "OK" }));

    let metrics_listener = TcpListener::bind(&metrics_addr).await?;
    let metrics_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let server = axum::serve(metrics_listener, metrics_app);
            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!("Metrics server error: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Metrics server shutting down");
                }
            }
        })
    };

    info!("SMS gateway dev server started");
    info!("Press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    let _ = shutdown_tx.send(());
    worker.shutdown();
    queue.stop().await;

    let shutdown_timeout = Duration::from_secs(30);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = worker_handle.await;
        let _ = api_handle.await;
        let _ = metrics_handle.await;
    })
    .await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
