use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::booking::BookingError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    SlotUnavailable(String),

    #[error("validation failed")]
    Validation(Vec<String>),

    #[error("{0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Llm(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SlotUnavailable(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = match &self {
            AppError::Validation(errors) => serde_json::json!({ "errors": errors }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::PatientNotFound { .. } | BookingError::AppointmentNotFound { .. } => {
                AppError::NotFound(err.to_string())
            }
            BookingError::SlotUnavailable { .. } => AppError::SlotUnavailable(err.to_string()),
            BookingError::Store(e) => AppError::Store(e),
        }
    }
}
