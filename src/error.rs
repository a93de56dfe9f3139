use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{error_codes, error_to_api_response};

#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    UpstreamUnavailable,
    UpstreamFailed(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR, msg)
            }
            AppError::UpstreamUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                error_codes::UPSTREAM_UNAVAILABLE,
                "Service is not configured".to_string(),
            ),
            AppError::UpstreamFailed(detail) => {
                tracing::error!("Upstream call failed: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    error_codes::UPSTREAM_FAILED,
                    "Upstream service failed".to_string(),
                )
            }
        };

        (status, error_to_api_response::<()>(code, msg)).into_response()
    }
}
