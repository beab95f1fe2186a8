//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use messaging_types::MessagingError;

/// Wire shape for every error response: a stable string code plus a message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

pub struct ApiError(pub MessagingError);

impl From<MessagingError> for ApiError {
    fn from(err: MessagingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after_ms = match &self.0 {
            MessagingError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            MessagingError::AbuseBlocked { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.0.error_code().to_string(),
            message: self.0.to_string(),
            retry_after_ms,
        };
        (status, Json(body)).into_response()
    }
}
