use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use db::RUN_LOG_ATTACHMENT;
use pipes_core::RunDocument;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Number of runs returned by run listings.
pub const RUN_LIST_LIMIT: u32 = 10;

/// A run document plus the URL of its log, once attached.
#[derive(Debug, Serialize, ToSchema)]
pub struct RunView {
    #[serde(flatten)]
    pub run: RunDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_url: Option<String>,
}

impl From<RunDocument> for RunView {
    fn from(run: RunDocument) -> Self {
        let log_url = run
            .log_file
            .as_ref()
            .map(|_| format!("/runs/{}/log", run.id));
        Self { run, log_url }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartRunResponse {
    pub run_id: Uuid,
}

#[utoipa::path(
    get,
    path = "/runs",
    responses(
        (status = 200, description = "Most recent runs across all pipes", body = Vec<RunView>)
    ),
    tag = "runs"
)]
pub async fn list_recent_runs(State(state): State<AppState>) -> Result<Json<Vec<RunView>>, AppError> {
    let runs = state.store.list_recent_runs(RUN_LIST_LIMIT).await?;
    Ok(Json(runs.into_iter().map(RunView::from).collect()))
}

#[utoipa::path(
    get,
    path = "/runs/{id}",
    params(
        ("id" = Uuid, Path, description = "Pipe ID")
    ),
    responses(
        (status = 200, description = "Most recent runs of the pipe", body = Vec<RunView>)
    ),
    tag = "runs"
)]
pub async fn list_pipe_runs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RunView>>, AppError> {
    let runs = state.store.list_runs_for_pipe(id, RUN_LIST_LIMIT).await?;
    Ok(Json(runs.into_iter().map(RunView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/runs/{id}",
    params(
        ("id" = Uuid, Path, description = "Pipe ID")
    ),
    responses(
        (status = 202, description = "Run started", body = StartRunResponse),
        (status = 400, description = "Pipe is not connected"),
        (status = 404, description = "Pipe not found"),
        (status = 409, description = "A run is already in progress"),
        (status = 422, description = "Pipe connector is not registered")
    ),
    tag = "runs"
)]
pub async fn start_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<StartRunResponse>), AppError> {
    let handle = state.engine.run_pipe_by_id(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse { run_id: handle.id() }),
    ))
}

#[utoipa::path(
    get,
    path = "/runs/{id}/log",
    params(
        ("id" = Uuid, Path, description = "Run ID")
    ),
    responses(
        (status = 200, description = "Run log", body = String, content_type = "text/plain"),
        (status = 404, description = "Run or log not found")
    ),
    tag = "runs"
)]
pub async fn get_run_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let attachment = state.store.get_attachment(id, RUN_LOG_ATTACHMENT).await?;

    match attachment {
        Some(log) => Ok(([(header::CONTENT_TYPE, log.content_type)], log.data)),
        None => Err(AppError::NotFound(format!("No log for run: {}", id))),
    }
}
