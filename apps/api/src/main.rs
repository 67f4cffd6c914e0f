mod config;
mod db;
mod errors;
mod export;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod state;
mod store;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::export::S3Exporter;
use crate::llm_client::AnthropicClient;
use crate::pipeline::coordinator::{new_registry, GenerationCoordinator};
use crate::pipeline::orchestrator::{Orchestrator, RetryPolicy};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::{PostgresGenerationStore, PostgresJobStore, PostgresProfileStore};
use crate::store::{GenerationStore, JobStore, ProfileStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Draftsmith API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.database_max_connections).await?;

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let llm = Arc::new(AnthropicClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Stores and exporter behind the pipeline's narrow traits
    let profiles: Arc<dyn ProfileStore> = Arc::new(PostgresProfileStore::new(db.clone()));
    let jobs: Arc<dyn JobStore> = Arc::new(PostgresJobStore::new(db.clone()));
    let generations: Arc<dyn GenerationStore> = Arc::new(PostgresGenerationStore::new(db.clone()));
    let exporter = Arc::new(S3Exporter::new(s3, config.s3_bucket.clone()));

    // Orchestrator + coordinator
    let orchestrator = Arc::new(Orchestrator::new(
        llm,
        exporter,
        Arc::clone(&generations),
        RetryPolicy::default(),
    ));
    let coordinator = Arc::new(GenerationCoordinator::new(
        profiles,
        jobs,
        generations,
        orchestrator,
        new_registry(),
        config.max_concurrent_generations,
    ));
    info!(
        "Generation coordinator ready (max concurrent: {})",
        config.max_concurrent_generations
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        coordinator,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "draftsmith-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
