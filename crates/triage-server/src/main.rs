//! Triage Server
//!
//! Loads the triage model once, prepares the record store and serves the
//! prediction and summary endpoints.

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use triage_classifiers::{load_model, ClassifierAdapter};
use triage_core::FeatureVectorBuilder;
use triage_server::{create_router, AppState, Cli, LogFormat, ServerConfig};
use triage_service::TriageService;
use triage_store::{RecordStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose, cli.log_format);

    info!("Starting triage server");

    // Load configuration
    let config = ServerConfig::load(&cli)?;
    info!("Configuration loaded successfully");
    info!("Model: {}", config.model.path.display());
    match &config.store.path {
        Some(path) => info!("Database: {}", path.display()),
        None => warn!("No database path configured; records are kept in memory only"),
    }
    info!("Feature schema: {} fields", config.schema.len());

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    // Load the model; refuse to serve without it
    let schema = Arc::new(config.schema.clone());
    let model = load_model(&config.model).context("model failed to load")?;
    let classifier = ClassifierAdapter::new(model, schema.clone())?;
    info!("Classifier '{}' ready", classifier.name());

    // Prepare the record store
    let store = SqliteStore::open(&config.store, schema.clone())?;
    store.ensure_schema().await?;

    let service = TriageService::new(
        FeatureVectorBuilder::new(schema),
        classifier,
        Arc::new(store),
    );
    let state = AppState::new(service).with_metrics(metrics_handle);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid listen address {}", config.bind_address()))?;

    let app = create_router(state, Duration::from_millis(config.request_timeout_ms));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Triage server listening on http://{}", addr);

    // Graceful shutdown handler
    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
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

/// Initialize tracing/logging
fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("triage=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("triage=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "triage_submissions_total",
        "Total number of submissions by outcome"
    );
    metrics::describe_counter!(
        "triage_predictions_total",
        "Total number of stored predictions by triage level"
    );
    metrics::describe_histogram!(
        "triage_submit_latency_us",
        metrics::Unit::Microseconds,
        "End-to-end submit latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
