//! meshdb-sync
//!
//! Mirrors the UISP inventory into a MeshDB topology export. Runs the
//! reconciler once, or on an interval until interrupted, and writes the
//! resulting topology back out.
//!
//! ```text
//! topology.json ──► MemoryStore ◄── Reconciler ◄── UISP API / snapshot.json
//!                        │               │
//!                        ▼               ▼
//!                 --export file    NotificationDispatcher ──► log / webhook
//! ```

use anyhow::Context;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use clap::Parser;
use prometheus::{IntCounter, IntCounterVec, IntGauge};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meshdb_core::domain::ports::{ChangeNotifierRef, InventorySourceRef};
use meshdb_core::notify::{LogNotifier, WebhookNotifier};
use meshdb_core::{
    Error, ErrorAction, MemoryStore, MeshConfig, NotificationDispatcher, ReconcileReport,
    ReconcileScope, Reconciler, SnapshotInventory, UispInventory,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// MeshDB sync - mirror UISP devices and links into the topology database
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "MESHDB_CONFIG")]
    config: Option<PathBuf>,

    /// Topology JSON export to load before reconciling
    #[arg(long, env = "MESHDB_TOPOLOGY")]
    topology: Option<PathBuf>,

    /// Write the reconciled topology to this file
    #[arg(long, env = "MESHDB_EXPORT")]
    export: Option<PathBuf>,

    /// Read inventory from a recorded snapshot instead of the UISP API
    #[arg(long, env = "UISP_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// UISP base URL
    #[arg(long, env = "UISP_URL")]
    uisp_url: Option<String>,

    /// UISP API token
    #[arg(long, env = "UISP_TOKEN", hide_env_values = true)]
    uisp_token: Option<String>,

    /// Webhook receiving change notifications
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Only reconcile the node with this network number
    #[arg(long, env = "NETWORK_NUMBER")]
    network_number: Option<u32>,

    /// Reconcile every N seconds instead of once
    #[arg(long, env = "SYNC_INTERVAL")]
    interval_secs: Option<u64>,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Metrics
// =============================================================================

struct SyncMetrics {
    runs: IntCounter,
    failed_runs: IntCounter,
    records: IntCounterVec,
    diagnostics: IntGauge,
}

impl SyncMetrics {
    fn register() -> anyhow::Result<Self> {
        Ok(Self {
            runs: prometheus::register_int_counter!(
                "meshdb_sync_runs_total",
                "Completed reconcile runs"
            )?,
            failed_runs: prometheus::register_int_counter!(
                "meshdb_sync_failed_runs_total",
                "Reconcile runs aborted before any change"
            )?,
            records: prometheus::register_int_counter_vec!(
                "meshdb_sync_records_total",
                "Records created or updated by the reconciler",
                &["record", "action"]
            )?,
            diagnostics: prometheus::register_int_gauge!(
                "meshdb_sync_diagnostics",
                "Records skipped by the last run"
            )?,
        })
    }

    fn observe(&self, report: &ReconcileReport) {
        self.runs.inc();
        let counts = [
            ("device", "created", report.devices_created),
            ("device", "updated", report.devices_updated),
            ("link", "created", report.links_created),
            ("link", "updated", report.links_updated),
            ("los", "created", report.los_created),
            ("los", "updated", report.los_updated),
        ];
        for (record, action, count) in counts {
            self.records
                .with_label_values(&[record, action])
                .inc_by(u64::from(count));
        }
        self.diagnostics.set(report.diagnostics.len() as i64);
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting {} v{}", meshdb_core::NAME, meshdb_core::VERSION);

    let config = load_config(&args)?;
    let scope = match args.network_number {
        Some(nn) => ReconcileScope::NetworkNumber(nn),
        None => ReconcileScope::All,
    };
    info!("  Scope: {}", scope);
    info!(
        "  Grace period: {} days",
        config.reconciler.grace_period_days
    );

    let store = match &args.topology {
        Some(path) => MemoryStore::from_json_file(path)
            .with_context(|| format!("loading topology from {}", path.display()))?,
        None => {
            warn!("No topology given, starting from an empty store");
            MemoryStore::new()
        }
    };

    let inventory: InventorySourceRef = match &args.snapshot {
        Some(path) => Arc::new(
            SnapshotInventory::from_json_file(path)
                .with_context(|| format!("loading snapshot from {}", path.display()))?,
        ),
        None => Arc::new(UispInventory::new(&config.uisp)?),
    };

    let sink: ChangeNotifierRef = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_secs(config.notifications.webhook_timeout_secs),
        )?),
        None => Arc::new(LogNotifier),
    };
    let dispatcher = NotificationDispatcher::new(sink, config.notifications.clone());

    let reconciler = Reconciler::new(
        store.clone(),
        inventory,
        dispatcher.clone(),
        config.reconciler.clone(),
    )?;

    let metrics = SyncMetrics::register()?;

    match args.interval_secs {
        None => {
            let report = reconciler.run(scope).await?;
            metrics.observe(&report);
            log_diagnostics(&report);
        }
        Some(interval) => {
            let ready = Arc::new(AtomicBool::new(false));
            spawn_servers(&args, ready.clone());

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl-C, finishing up");
                }
                signal.cancel();
            });

            run_periodically(
                &reconciler,
                scope,
                Duration::from_secs(interval),
                &metrics,
                &ready,
                &shutdown,
            )
            .await?;
        }
    }

    if let Some(path) = &args.export {
        store
            .export_json_file(path)
            .with_context(|| format!("exporting topology to {}", path.display()))?;
        info!("Exported topology to {}", path.display());
    }

    dispatcher.flush().await;
    let stats = dispatcher.stats();
    info!(
        "Notifications: {} delivered, {} dropped",
        stats.delivered, stats.dropped
    );

    info!("Sync shutdown complete");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<MeshConfig> {
    let mut config = match &args.config {
        Some(path) => MeshConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => MeshConfig::default(),
    };

    // CLI and environment win over the file
    if let Some(url) = &args.uisp_url {
        config.uisp.base_url = Some(url.clone());
    }
    if let Some(token) = &args.uisp_token {
        config.uisp.token = Some(token.clone());
    }
    if let Some(url) = &args.webhook_url {
        config.notifications.webhook_url = Some(url.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn run_periodically(
    reconciler: &Reconciler,
    scope: ReconcileScope,
    interval: Duration,
    metrics: &SyncMetrics,
    ready: &AtomicBool,
    shutdown: &CancellationToken,
) -> Result<(), Error> {
    let mut retry = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(5))
        .with_max_interval(interval.max(Duration::from_secs(5)))
        .with_max_elapsed_time(None)
        .build();

    loop {
        let delay = match reconciler.run(scope).await {
            Ok(report) => {
                metrics.observe(&report);
                log_diagnostics(&report);
                ready.store(true, Ordering::Relaxed);
                retry.reset();
                interval
            }
            Err(e) => {
                metrics.failed_runs.inc();
                match e.action() {
                    ErrorAction::NoRequeue => {
                        error!("Reconcile failed permanently: {}", e);
                        return Err(e);
                    }
                    ErrorAction::RequeueAfter(delay) => {
                        warn!("Reconcile failed, retrying in {:?}: {}", delay, e);
                        delay
                    }
                    ErrorAction::RequeueWithBackoff => {
                        let delay = retry.next_backoff().unwrap_or(interval);
                        warn!("Reconcile failed, retrying in {:?}: {}", delay, e);
                        delay
                    }
                }
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn log_diagnostics(report: &ReconcileReport) {
    for diagnostic in &report.diagnostics {
        warn!(subject = %diagnostic.subject, "{}", diagnostic.message);
    }
}

fn spawn_servers(args: &Args, ready: Arc<AtomicBool>) {
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, ready).await {
            error!("Health server error: {}", e);
        }
    });

    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => args.log_level.to_lowercase(),
        _ => "info".to_string(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn", level)));

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(status: hyper::StatusCode, body: impl Into<hyper::Body>) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str, ready: Arc<AtomicBool>) -> Result<(), Error> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let ready = ready.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let ready = ready.load(Ordering::Relaxed);
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => text_response(StatusCode::OK, "ok"),
                        "/readyz" if ready => text_response(StatusCode::OK, "ok"),
                        "/readyz" => text_response(StatusCode::SERVICE_UNAVAILABLE, "no completed run yet"),
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<(), Error> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    match encoder.encode(&prometheus::gather(), &mut buffer) {
                        Ok(()) => {
                            let mut response = text_response(StatusCode::OK, buffer);
                            if let Ok(value) = encoder.format_type().parse() {
                                response.headers_mut().insert("Content-Type", value);
                            }
                            response
                        }
                        Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                    }
                }
                _ => text_response(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
