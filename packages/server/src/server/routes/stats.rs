use axum::extract::Extension;
use axum::Json;
use scrape_engine::JobStats;
use serde::Serialize;

use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub jobs: JobStats,
    /// Background tasks currently active
    pub active_tasks: usize,
    /// Requests in the current rate-limit window
    pub requests_in_window: usize,
    pub sources: Vec<String>,
    pub exporters: Vec<String>,
}

/// Aggregate job and record counters.
pub async fn stats_handler(Extension(state): Extension<AppState>) -> ApiResult<Json<StatsResponse>> {
    let orchestrator = &state.orchestrator;
    let jobs = orchestrator.store().stats().await?;

    Ok(Json(StatsResponse {
        jobs,
        active_tasks: orchestrator.running_jobs().await.len(),
        requests_in_window: orchestrator.limiter().in_window().await,
        sources: orchestrator.sources().source_ids(),
        exporters: orchestrator.exporters().destination_ids(),
    }))
}
