use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use scrape_engine::EngineError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::UnknownSource(_)
            | EngineError::UnknownExporter(_)
            | EngineError::InvalidRequest { .. } => ApiError::BadRequest(e.to_string()),
            EngineError::JobNotFound(_) => ApiError::NotFound(e.to_string()),
            EngineError::Storage(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<scrape_engine::StoreError> for ApiError {
    fn from(e: scrape_engine::StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
