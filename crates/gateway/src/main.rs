//! StudyForge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Request routing
//! - Streaming transport (SSE)
//! - Observability (logging, metrics, tracing)
//!
//! Authentication itself happens upstream; handlers receive the resolved
//! user id via the X-User-Id header.

mod handlers;
mod user;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use studyforge_assistant::AssistantService;
use studyforge_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    llm::OpenAiChat,
    metrics,
};
use studyforge_ingestion::{ChunkingConfig, HttpFetcher, IngestionService};
use studyforge_search::{Retriever, SqlVectorStore};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Repository,
    pub assistant: Arc<AssistantService>,
    pub ingestion: Arc<IngestionService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone()));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!("Starting StudyForge API Gateway v{}", studyforge_common::VERSION);

    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("Prometheus metrics on {}", addr);
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);

    // Providers
    let embedder = create_embedder(
        &config.embedding.provider,
        config.embedding.api_key.clone(),
        Some(config.embedding.model.clone()),
        config.embedding.api_base.clone(),
    );
    let llm = Arc::new(OpenAiChat::new(
        config.llm.endpoint.clone(),
        config.llm.api_key.clone().unwrap_or_default(),
        config.llm.model.clone(),
        config.llm.timeout_secs,
    )?);

    // Services
    let store = Arc::new(SqlVectorStore::new(repository.clone()));
    let retriever = Arc::new(Retriever::new(
        embedder.clone(),
        store.clone(),
        repository.clone(),
    ));
    let assistant = Arc::new(AssistantService::new(
        repository.clone(),
        retriever,
        llm,
    ));
    let ingestion = Arc::new(IngestionService::new(
        repository.clone(),
        Arc::new(HttpFetcher::new(config.ingestion.fetch_timeout_secs)),
        embedder,
        store,
        ChunkingConfig {
            chunk_size: config.ingestion.chunk_size,
            chunk_overlap: config.ingestion.chunk_overlap,
        },
    ));

    // Create app state
    let state = AppState {
        config: config.clone(),
        repository,
        assistant,
        ingestion,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
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
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Assistant endpoints
        .route("/ask", post(handlers::assistant::ask))
        .route("/ask/stream", post(handlers::assistant::ask_stream))
        .route("/summaries", post(handlers::assistant::summarize))
        .route("/exams", post(handlers::assistant::generate_exam))
        .route("/advise", post(handlers::assistant::advise))

        // Material ingestion endpoints
        .route("/materials/{id}/ingest", post(handlers::materials::trigger_ingest))
        .route("/materials/{id}/status", get(handlers::materials::material_status));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
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
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
