//! HybridRAG API Gateway
//!
//! HTTP entry point for the conversational answer service.
//! Handles:
//! - Conversation and tenant administration routes
//! - Request ids, tracing, CORS and timeouts
//! - Observability (logging, Prometheus metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use hybridrag_common::{config::AppConfig, db::DbPool, metrics, Repository};
use hybridrag_context::{ConversationService, GraphStore, Neo4jGraphStore, ProviderModels};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::oneshot};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    pub graph: Arc<dyn GraphStore>,
    pub conversations: Arc<ConversationService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);

    init_tracing(&config);
    info!(
        service = %config.observability.service_name,
        "Starting HybridRAG API Gateway v{}",
        hybridrag_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repo = Repository::new(db);

    // Knowledge graph
    let graph: Arc<dyn GraphStore> = Arc::new(Neo4jGraphStore::connect(&config.graph).await?);
    graph.ensure_fulltext_index(&config.graph.fulltext_index).await?;

    let conversations = Arc::new(ConversationService::new(
        Arc::new(repo.clone()),
        graph.clone(),
        Arc::new(repo.clone()),
        Arc::new(ProviderModels::new(config.llm.clone())),
        &config,
    ));

    let state = AppState {
        config: config.clone(),
        repo,
        graph,
        conversations,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (draining_tx, draining_rx) = oneshot::channel();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = draining_tx.send(());
    });

    tokio::select! {
        result = server.into_future() => result?,
        _ = drain_deadline(draining_rx, config.shutdown_timeout()) => {
            warn!(
                timeout_secs = config.shutdown_timeout().as_secs(),
                "Shutdown timed out with requests still in flight"
            );
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves `timeout` after shutdown starts; never resolves otherwise
async fn drain_deadline(draining: oneshot::Receiver<()>, timeout: Duration) {
    if draining.await.is_ok() {
        tokio::time::sleep(timeout).await;
    } else {
        std::future::pending::<()>().await;
    }
}

fn init_tracing(config: &AppConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
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

    let api_routes = Router::new()
        // Conversations
        .route("/{tenant}/conversations", post(handlers::conversations::converse))
        .route(
            "/{tenant}/conversations/{user_id}",
            delete(handlers::conversations::reset),
        )
        // Tenant administration
        .route(
            "/tenants",
            post(handlers::tenants::create_tenant).get(handlers::tenants::list_tenants),
        )
        .route(
            "/tenants/{tenant}",
            get(handlers::tenants::get_tenant).patch(handlers::tenants::update_tenant),
        )
        .route("/tenants/{tenant}/activate", post(handlers::tenants::activate_tenant))
        .route("/tenants/{tenant}/deactivate", post(handlers::tenants::deactivate_tenant));

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
