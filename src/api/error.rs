use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::aggregator::ScopeError;
use crate::upstream::UpstreamError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Raw upstream body, when the failure came from a provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Missing credential or other configuration value; fatal for this
    /// request only, never for the process.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Upstream non-success, passed through with the upstream's status and
    /// raw error body.
    pub fn upstream(context: impl Into<String>, status: u16, body: String) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: context.into(),
            details: Some(body),
        }
    }

    /// Failed call-bridge submit. Always a 500 regardless of the upstream
    /// status, with the raw upstream body kept in the details.
    pub fn bridge(context: impl Into<String>, e: UpstreamError) -> Self {
        let details = match e {
            UpstreamError::Status { body, .. } => body,
            UpstreamError::Transport(e) => e.to_string(),
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: context.into(),
            details: Some(details),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                details: self.details,
            }),
        )
            .into_response()
    }
}

impl From<UpstreamError> for ApiError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Status { status, body } => {
                ApiError::upstream("Upstream provider request failed", status, body)
            }
            UpstreamError::Transport(e) => {
                ApiError::internal(format!("Upstream request failed: {e}"))
            }
        }
    }
}

impl From<ScopeError> for ApiError {
    fn from(e: ScopeError) -> Self {
        ApiError::forbidden(e.to_string())
    }
}
