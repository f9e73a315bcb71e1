/*!
 * API Error Responses
 *
 * Maps pipeline errors onto HTTP statuses: 401 for a missing key, 403 for
 * a mismatch, 400 for validation, 429 for the rate limiter, 500 for the
 * rest. Bodies are small `{status, message}` objects; event bodies are
 * never echoed back.
 */

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// API errors
#[derive(Debug)]
pub enum ApiError {
    MissingApiKey,
    InvalidApiKey,
    Validation { missing: Vec<String> },
    NotAList,
    BulkFailures { failed: usize, total: usize },
    RateLimited,
    Internal(String),
}

/// API error response body
#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingApiKey => (
                StatusCode::UNAUTHORIZED,
                "X-Pulse-API-Key header is missing".to_string(),
            ),
            ApiError::InvalidApiKey => (
                StatusCode::FORBIDDEN,
                "Invalid Authorization token".to_string(),
            ),
            ApiError::Validation { missing } => (
                StatusCode::BAD_REQUEST,
                format!("Missing required fields: {}", missing.join(", ")),
            ),
            ApiError::NotAList => (
                StatusCode::BAD_REQUEST,
                "Events must be a list".to_string(),
            ),
            ApiError::BulkFailures { failed, total } => (
                StatusCode::BAD_REQUEST,
                format!("Failed to ingest {failed} of {total} events"),
            ),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        (
            status,
            Json(ErrorResponse {
                status: "error",
                message,
            }),
        )
            .into_response()
    }
}
