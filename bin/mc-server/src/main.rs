//! Memcard Record Server
//!
//! Serves the `job_requests` record API, seeds the initial superusers once,
//! and notifies the job-processing API about every new job request.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MC_CONFIG_FILE` | - | Optional TOML config file |
//! | `MC_BIND_ADDR` | `0.0.0.0:8090` | Record API listen address |
//! | `MC_METRICS_ADDR` | `0.0.0.0:9090` | Metrics/health listen address |
//! | `MC_DATA_DIR` | `./pb_data` | Data directory |
//! | `MC_DATABASE_URL` | `sqlite://{data_dir}/data.db?mode=rwc` | Store URL |
//! | `INTERNAL_API_URL` | - | Job-processing API base URL |
//! | `MC_DISPATCH_WORKERS` | `8` | Concurrent dispatches |
//! | `MC_DISPATCH_TIMEOUT_SECS` | `10` | Per-attempt timeout |
//! | `INITIAL_ADMIN_EMAIL` / `INITIAL_ADMIN_PASSWORD` | - | Administrator account |
//! | `TEMPORAL_BOT_EMAIL` / `TEMPORAL_BOT_PASSWORD` | - | Service account |
//! | `MC_LOG_FORMAT` | `text` | `text` or `json` |
//! | `RUST_LOG` | `info` | Log level |
//!
//! See `mc-config` for the full list.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mc_common::JobRequests;
use mc_config::{AppConfig, LogFormat};
use mc_dispatch::{DispatchPool, HttpJobTrigger, JobRequestDispatchHook};
use mc_platform::api::{api_router, RecordsState};
use mc_platform::{HookRegistry, InitialSuperusersMigration, MigrationRunner, SqliteStore};

const SERVER_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(config.logging.format);

    info!("Starting Memcard record server");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // 1. Store and run-once migrations
    let store = Arc::new(open_store(&config).await?);
    let runner = MigrationRunner::new().register(InitialSuperusersMigration::new(config.seed.clone()));
    let applied = runner
        .apply_pending(store.as_ref(), store.as_ref())
        .await
        .context("Startup migrations failed")?;
    info!(applied = applied.len(), "Migrations complete");

    // 2. Dispatcher
    if config.dispatch.internal_api_url.trim().is_empty() {
        warn!("INTERNAL_API_URL is not set; job request dispatches will fail");
    }
    let trigger = HttpJobTrigger::new(&config.dispatch).context("Failed to build HTTP client")?;
    info!(endpoint = trigger.endpoint(), "Job trigger configured");
    let pool = DispatchPool::start(&config.dispatch, Arc::new(trigger));

    let mut hooks = HookRegistry::new();
    hooks.on_record_created::<JobRequests>(Arc::new(JobRequestDispatchHook::new(pool.handle())));

    // 3. Record API
    let app = api_router(RecordsState {
        store: store.clone(),
        hooks: Arc::new(hooks),
    })
    .layer(TraceLayer::new_for_http())
    .layer(cors_layer(config.server.cors_origin.as_deref())?);

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!("Record API listening on http://{}", config.server.bind_addr);

    let api_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
            {
                error!(error = %e, "Record API server failed");
            }
        })
    };

    // 4. Metrics and health
    let metrics_app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(metrics);

    let metrics_listener = TcpListener::bind(&config.server.metrics_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.metrics_addr))?;
    info!("Metrics server listening on http://{}/metrics", config.server.metrics_addr);

    let metrics_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(metrics_listener, metrics_app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        })
    };

    info!("Memcard record server started");

    shutdown_signal().await;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(());

    // Stop taking records before draining their dispatches.
    if tokio::time::timeout(SERVER_JOIN_TIMEOUT, api_handle).await.is_err() {
        warn!("Record API did not stop within {:?}", SERVER_JOIN_TIMEOUT);
    }

    if !pool.shutdown(config.server.shutdown_grace()).await {
        warn!("Abandoning unfinished job request dispatches");
    }

    let _ = tokio::time::timeout(SERVER_JOIN_TIMEOUT, metrics_handle).await;

    info!("Memcard record server shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok());
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// `RUST_LOG` directives when set and valid, otherwise `info`
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

async fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    if config.database.url.is_none() {
        std::fs::create_dir_all(&config.database.data_dir).with_context(|| {
            format!("Failed to create data dir {}", config.database.data_dir.display())
        })?;
    }

    let url = config.database.connection_url();
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&url)
        .await
        .with_context(|| format!("Failed to open store at {}", url))?;

    let store = SqliteStore::new(pool);
    store.init_schema().await?;
    info!("Using SQLite store: {}", url);
    Ok(store)
}

fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    Ok(match origin {
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .with_context(|| format!("Invalid CORS origin {:?}", origin))?;
            layer.allow_origin(origin)
        }
        None => layer.allow_origin(Any),
    })
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ready_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "READY"
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
