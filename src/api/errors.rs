use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable reason code (e.g. "not_found", "invalid_step").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Application error type that converts to HTTP responses.
pub enum AppError {
    BadRequest(String),
    /// Rejection with a reason code the caller can branch on.
    Rejected { status: StatusCode, reason: String, message: String },
    Internal(anyhow::Error),
}

impl AppError {
    pub fn invalid_step(index: usize) -> Self {
        AppError::Rejected {
            status: StatusCode::BAD_REQUEST,
            reason: "invalid_step".to_string(),
            message: format!("Step index {} does not exist in this run", index),
        }
    }

    pub fn run_not_found(run_id: &str) -> Self {
        AppError::Rejected {
            status: StatusCode::NOT_FOUND,
            reason: "not_found".to_string(),
            message: format!("Run '{}' not found", run_id),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, reason, details) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None, None),
            AppError::Rejected {
                status,
                reason,
                message,
            } => (status, message, Some(reason), None),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                None,
                Some(format!("{:#}", err)),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                reason,
                details,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}
