use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::EngineError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Database(db::DbError),
    Engine(EngineError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Database(err) => database_error(err),
            AppError::Engine(err) => match err {
                EngineError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
                EngineError::Admission(msg) => (StatusCode::CONFLICT, "run_in_progress", msg),
                EngineError::Configuration(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "configuration_error", msg)
                }
                EngineError::PipeNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("Pipe not found: {}", id),
                ),
                EngineError::Persistence(err) => database_error(err),
                other => {
                    tracing::error!("Run engine error: {:?}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        other.to_string(),
                    )
                }
            },
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

fn database_error(err: db::DbError) -> (StatusCode, &'static str, String) {
    match err {
        db::DbError::PipeNotFound(id) => (
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Pipe not found: {}", id),
        ),
        db::DbError::RunNotFound(id) => (
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Run not found: {}", id),
        ),
        db::DbError::Conflict(id) => (
            StatusCode::CONFLICT,
            "conflict",
            format!("Pipe {} was modified concurrently", id),
        ),
        other => {
            tracing::error!("Database error: {:?}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
                "Database error occurred".to_string(),
            )
        }
    }
}

impl From<db::DbError> for AppError {
    fn from(err: db::DbError) -> Self {
        AppError::Database(err)
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}
