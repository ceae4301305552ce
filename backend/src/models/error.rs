use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("No image file provided")]
    MissingImage,

    #[error("Invalid enhancement parameters: {0}")]
    ValidationError(String),

    #[error("Unsupported image type: {0}")]
    InvalidMimeType(String),

    #[error("Uploaded file is too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Topaz API key is not configured")]
    ApiKeyMissing,

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },

    #[error("Topaz rejected the request ({status}): {detail}")]
    UpstreamRejected { status: u16, detail: String },

    #[error("Topaz request failed: {0}")]
    UpstreamFailed(String),

    #[error("Topaz request timed out")]
    UpstreamTimeout,

    #[error("Unexpected payload from Topaz: {0}")]
    UnexpectedPayload(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// RFC 7807 style problem body returned on every error response.
#[derive(Debug, Serialize)]
pub struct ProblemDetail {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingImage | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidMimeType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ProcessNotFound(_) | AppError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ApiKeyMissing | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamRejected { .. } => StatusCode::BAD_REQUEST,
            AppError::UpstreamFailed(_) | AppError::UnexpectedPayload(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingImage => "MISSING_IMAGE",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InvalidMimeType(_) => "INVALID_MIME_TYPE",
            AppError::FileTooLarge(_) => "FILE_TOO_LARGE",
            AppError::ProcessNotFound(_) => "PROCESS_NOT_FOUND",
            AppError::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            AppError::ApiKeyMissing => "API_KEY_MISSING",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
            AppError::UpstreamFailed(_) => "UPSTREAM_FAILED",
            AppError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            AppError::UnexpectedPayload(_) => "UNEXPECTED_PAYLOAD",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            AppError::MissingImage => "Missing Image",
            AppError::ValidationError(_) => "Validation Failed",
            AppError::InvalidMimeType(_) => "Unsupported Media Type",
            AppError::FileTooLarge(_) => "Payload Too Large",
            AppError::ProcessNotFound(_) => "Process Not Found",
            AppError::RouteNotFound(_) => "Route Not Found",
            AppError::ApiKeyMissing => "Service Misconfigured",
            AppError::RateLimited { .. } => "Too Many Requests",
            AppError::UpstreamRejected { .. } => "Upstream Rejected Request",
            AppError::UpstreamFailed(_) => "Upstream Failure",
            AppError::UpstreamTimeout => "Upstream Timeout",
            AppError::UnexpectedPayload(_) => "Unexpected Upstream Payload",
            AppError::Internal(_) => "Internal Server Error",
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn to_problem_detail(&self, request_id: String) -> ProblemDetail {
        ProblemDetail {
            problem_type: format!(
                "https://webenhance.dev/problems/{}",
                self.code().to_lowercase().replace('_', "-")
            ),
            title: self.title().to_string(),
            status: self.status_code().as_u16(),
            detail: self.to_string(),
            code: self.code().to_string(),
            request_id,
            retry_after: self.retry_after(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), "{}", self);
        } else {
            warn!(code = self.code(), "{}", self);
        }

        // The request-id middleware overwrites this header with the real id;
        // the body keeps whatever id the response was built with.
        let request_id = uuid::Uuid::new_v4().to_string();
        let problem = self.to_problem_detail(request_id);
        let body = serde_json::to_string(&problem).unwrap_or_else(|_| {
            format!(
                "{{\"title\":\"Internal Server Error\",\"status\":{}}}",
                status.as_u16()
            )
        });

        let mut response = (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            body,
        )
            .into_response();
        if let Some(retry_after) = problem.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
