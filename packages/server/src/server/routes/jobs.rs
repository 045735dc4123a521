use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use scrape_engine::{Job, JobId, JobStatus};
use serde::{Deserialize, Serialize};

use crate::server::app::AppState;
use crate::server::error::{ApiError, ApiResult};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Job record plus live state from the running-job table.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl JobView {
    async fn load(state: &AppState, job: Job) -> Self {
        let running = state.orchestrator.is_running(job.id).await;
        let duration_ms = job.duration().map(|d| d.num_milliseconds());
        Self {
            job,
            running,
            duration_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct JobList {
    pub jobs: Vec<JobView>,
    pub limit: usize,
    pub offset: usize,
}

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id: {}", raw)))
}

pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let id = parse_job_id(&id)?;
    let job = state
        .orchestrator
        .store()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job not found: {}", id)))?;

    Ok(Json(JobView::load(&state, job).await))
}

/// Newest first, optionally filtered by status.
pub async fn list_jobs_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobList>> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<JobStatus>().map_err(ApiError::BadRequest))
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let jobs = state.orchestrator.store().list(status, limit, offset).await?;

    let mut views = Vec::with_capacity(jobs.len());
    for job in jobs {
        views.push(JobView::load(&state, job).await);
    }

    Ok(Json(JobList {
        jobs: views,
        limit,
        offset,
    }))
}

/// Signal a running job to stop. 404 when nothing is running under that id.
pub async fn cancel_job_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_job_id(&id)?;

    if state.orchestrator.cancel(id).await {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::NotFound(format!("job is not running: {}", id)))
    }
}
