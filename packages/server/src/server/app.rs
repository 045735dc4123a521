use anyhow::{Context, Result};
use axum::http::{header::CONTENT_TYPE, Method};
use axum::routing::{get, post};
use axum::{Extension, Router};
use scrape_engine::adapters::register_selector_sources;
use scrape_engine::exporters::{JsonFileExporter, MemoryExporter, SqliteExporter};
use scrape_engine::{
    ExporterRegistry, JobStore, MemoryJobStore, Orchestrator, SourceRegistry, SqliteJobStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{load_sources, Config};
use crate::server::routes::{
    cancel_job_handler, get_job_handler, health_handler, list_jobs_handler, scrape_handler,
    stats_handler,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Wire stores, sources and exporters from configuration.
pub async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let mut exporters = ExporterRegistry::new()
        .with("json", Arc::new(JsonFileExporter::new(&config.export_dir)))
        .with("memory", Arc::new(MemoryExporter::new()));

    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(url) => {
            let options = SqliteConnectOptions::from_str(url)
                .context("DATABASE_URL must be a valid SQLite URL")?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
                .context("Failed to connect to database")?;

            exporters.register(
                "sqlite",
                Arc::new(
                    SqliteExporter::from_pool(pool.clone())
                        .await
                        .context("Failed to prepare record table")?,
                ),
            );
            Arc::new(
                SqliteJobStore::from_pool(pool)
                    .await
                    .context("Failed to prepare job table")?,
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory");
            Arc::new(MemoryJobStore::new())
        }
    };

    let mut sources = SourceRegistry::new();
    if let Some(path) = &config.sources_file {
        let definitions = load_sources(path)?;
        tracing::info!(count = definitions.len(), "loaded source definitions");
        register_selector_sources(&mut sources, definitions);
    }

    Ok(Orchestrator::new(
        store,
        sources,
        exporters,
        config.orchestrator.clone(),
    ))
}

/// Build the Axum application router
pub fn build_app(orchestrator: Orchestrator) -> Router {
    let state = AppState { orchestrator };

    // CORS configuration - allow any origin for development
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/scrape", post(scrape_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/:id", get(get_job_handler))
        .route("/jobs/:id/cancel", post(cancel_job_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
