use axum::extract::rejection::JsonRejection;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use scrape_engine::{JobConfig, JobId, ScrapeRequest};
use serde::{Deserialize, Serialize};

use crate::server::app::AppState;
use crate::server::error::{ApiError, ApiResult};

/// Body of `POST /scrape`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeBody {
    pub url: String,
    /// Source id the adapter is resolved from
    pub website_code: String,
    #[serde(default)]
    pub exporters: Vec<String>,
    #[serde(default = "first_page")]
    pub start: u32,
    #[serde(default = "first_page")]
    pub limit: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub job_id: JobId,
}

/// Submit a scrape job; returns as soon as the job is created.
pub async fn scrape_handler(
    Extension(state): Extension<AppState>,
    payload: Result<Json<ScrapeBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ScrapeResponse>)> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if body.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url is required".into()));
    }
    if body.website_code.trim().is_empty() {
        return Err(ApiError::BadRequest("websiteCode is required".into()));
    }

    let request = ScrapeRequest::new(
        body.website_code,
        JobConfig::new(body.url)
            .with_exporters(body.exporters)
            .with_pages(body.start, body.limit),
    );

    let job_id = state.orchestrator.submit(request).await?;
    Ok((StatusCode::CREATED, Json(ScrapeResponse { job_id })))
}
