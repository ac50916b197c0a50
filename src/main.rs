//! buckcache service
//!
//! Runs the indirection cache over the in-process storage cluster and serves
//! health and Prometheus metrics endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        buckcache service                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ Indirection  │    │   Expiry     │    │ Health and   │       │
//! │  │    Cache     │    │   Sweeper    │    │   Metrics    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use buckcache::adapters::{InMemoryCluster, LoggingEventPublisher, PrometheusMetricsSink};
use buckcache::monitoring::HealthResponse;
use buckcache::{IndirectionCache, ServiceConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// buckcache - distributed build-artifact cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(long, env = "BUCKCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => ServiceConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    info!("Starting buckcache");
    info!("  Blob store: {}", config.engine.blob_store);
    info!("  Forward key store: {}", config.engine.forward_key_store);
    info!("  Reverse key store: {}", config.engine.reverse_key_store);
    info!("  Default TTL: {:?}", config.engine.default_ttl());

    let cluster = Arc::new(InMemoryCluster::new());
    let metrics = Arc::new(PrometheusMetricsSink::new());
    let cache = Arc::new(IndirectionCache::new(
        cluster.clone(),
        metrics.clone(),
        Arc::new(LoggingEventPublisher::info_level()),
    ));

    cache
        .init(&config.engine)
        .await
        .context("initializing cache engine")?;
    cache.start().await.context("starting cache engine")?;

    let shutdown = CancellationToken::new();
    let started_at = Instant::now();

    // Expiry sweeper
    let sweeper = tokio::spawn(run_sweeper(
        cluster.clone(),
        config.sweep_interval(),
        shutdown.clone(),
    ));

    // Health server
    let health_addr = args.health_addr.clone();
    let health_cache = cache.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_cache, started_at).await {
            error!("Health server error: {:#}", e);
        }
    });

    // Metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_sink = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_sink).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!("Expiry sweeper task failed: {}", e);
    }
    cache.stop().await.context("stopping cache engine")?;

    info!("buckcache shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?);

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
    Ok(())
}

// =============================================================================
// Expiry Sweeper
// =============================================================================

async fn run_sweeper(cluster: Arc<InMemoryCluster>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let purged = cluster.purge_expired();
                if purged > 0 {
                    info!(purged, "Swept expired cache records");
                }
            }
        }
    }
}

// =============================================================================
// HTTP Helpers
// =============================================================================

type Body = http_body_util::Full<hyper::body::Bytes>;

fn respond(
    status: hyper::StatusCode,
    content_type: &str,
    body: impl Into<hyper::body::Bytes>,
) -> hyper::Response<Body> {
    let mut response = hyper::Response::new(Body::new(body.into()));
    *response.status_mut() = status;
    if let Ok(value) = hyper::header::HeaderValue::from_str(content_type) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

async fn serve<F>(addr: &str, name: &'static str, handler: F) -> anyhow::Result<()>
where
    F: Fn(hyper::Request<hyper::body::Incoming>) -> hyper::Response<Body>
        + Clone
        + Send
        + Sync
        + 'static,
{
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid {} server address: {}", name, addr))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {} server", name))?;

    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .with_context(|| format!("{} server accept error", name))?;

        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let response = handler(req);
                async move { Ok::<_, std::convert::Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("{} server connection error: {}", name, e);
            }
        });
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(
    addr: &str,
    cache: Arc<IndirectionCache>,
    started_at: Instant,
) -> anyhow::Result<()> {
    use hyper::StatusCode;

    serve(addr, "Health", move |req| match req.uri().path() {
        "/healthz" | "/livez" | "/readyz" => {
            let response = HealthResponse::new(vec![cache.health_check()], started_at.elapsed());
            let status = if response.status.is_healthy() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            match serde_json::to_vec(&response) {
                Ok(body) => respond(status, "application/json", body),
                Err(e) => respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    e.to_string(),
                ),
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    })
    .await
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, metrics: Arc<PrometheusMetricsSink>) -> anyhow::Result<()> {
    use hyper::StatusCode;

    serve(addr, "Metrics", move |req| match req.uri().path() {
        "/metrics" => match metrics.encode() {
            Ok(text) => respond(StatusCode::OK, "text/plain; version=0.0.4", text),
            Err(e) => respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                e.to_string(),
            ),
        },
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    })
    .await
}
