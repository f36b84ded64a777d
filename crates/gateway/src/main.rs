//! EvidenceForge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Request validation and routing
//! - Rate limiting
//! - Request context sweeping
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use evidenceforge_common::{
    config::AppConfig,
    create_language_model, create_search_gateway,
    metrics::{self, metric_name, LATENCY_BUCKETS, SYNTHESIS_BUCKETS},
    EvidencePipeline,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<EvidencePipeline>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    let config = Arc::new(config);

    init_tracing(&config);
    info!("Starting EvidenceForge API Gateway v{}", evidenceforge_common::VERSION);

    // Initialize metrics
    init_metrics(&config)?;

    // Wire the evidence pipeline
    let search = create_search_gateway(&config.search)?;
    let model = create_language_model(&config.llm)?;
    let pipeline = Arc::new(EvidencePipeline::new(&config, search, model)?);
    info!(
        search_backend = pipeline.search_backend(),
        model = pipeline.model_name(),
        min_chunks = config.pipeline.min_chunks,
        min_documents = config.pipeline.min_documents,
        "Evidence pipeline ready"
    );

    let sweeper = pipeline.registry().clone().spawn_sweeper(config.sweep_interval());

    // Create app state
    let state = AppState {
        config: config.clone(),
        pipeline,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server.host: {}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (draining_tx, draining_rx) = oneshot::channel();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = draining_tx.send(());
    });

    let shutdown_timeout = config.shutdown_timeout();
    tokio::select! {
        result = server.into_future() => result?,
        _ = drain_deadline(draining_rx, shutdown_timeout) => {
            tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out, closing remaining connections"
            );
        }
    }

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing; `RUST_LOG` wins over the configured level
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logging {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Install the Prometheus exporter. Port 0 disables it.
fn init_metrics(config: &AppConfig) -> anyhow::Result<()> {
    let port = config.observability.metrics_port;
    if port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(metric_name("request_duration_seconds")),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(metric_name("retrieval_duration_seconds")),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(metric_name("synthesis_duration_seconds")),
            SYNTHESIS_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::register_metrics();
    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        // Probes
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Answers
        .route("/answer", post(handlers::answer::answer))

        // Stored request contexts
        .route("/contexts/{request_id}", get(handlers::contexts::get_context))
        .route("/contexts/{request_id}/synthesize", post(handlers::contexts::synthesize));

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    let request_timeout = state.config.request_timeout();

    // Compose the app
    Router::new()
        .nest("/v2", api_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Resolves `timeout` after draining starts; never resolves if it does not
async fn drain_deadline(draining: oneshot::Receiver<()>, timeout: Duration) {
    if draining.await.is_ok() {
        tokio::time::sleep(timeout).await;
    } else {
        std::future::pending::<()>().await;
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
