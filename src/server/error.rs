// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! HTTP 错误类型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::error::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Pipeline(e) => match e {
                PipelineError::InvalidRegion { .. } => StatusCode::BAD_REQUEST,
                PipelineError::SourceUnavailable | PipelineError::Stopped => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                PipelineError::EncodeFailure(_) | PipelineError::Detector(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("HTTP {}: {}", status.as_u16(), self);
        }

        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
