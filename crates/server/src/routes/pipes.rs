use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use pipes_core::{PipeConfig, SourceTable};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Create a pipe, or update it when `id` names an existing one.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SavePipeRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub connector_id: String,
    #[serde(default)]
    pub tables: Option<Vec<SourceTable>>,
    #[serde(default)]
    pub selected_table_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl SavePipeRequest {
    /// Copy the editable fields onto `pipe`. The run reference is left alone.
    fn apply(&self, mut pipe: PipeConfig) -> PipeConfig {
        pipe.name = self.name.trim().to_string();
        pipe.connector_id = self.connector_id.clone();
        pipe.tables = self.tables.clone();
        pipe.selected_table_id = self.selected_table_id.clone();
        pipe.settings = self.settings.clone();
        pipe
    }
}

#[utoipa::path(
    get,
    path = "/pipes",
    responses(
        (status = 200, description = "List of all pipes", body = Vec<PipeConfig>)
    ),
    tag = "pipes"
)]
pub async fn list_pipes(State(state): State<AppState>) -> Result<Json<Vec<PipeConfig>>, AppError> {
    let pipes = state.store.list_pipes().await?;
    Ok(Json(pipes))
}

#[utoipa::path(
    post,
    path = "/pipes",
    request_body = SavePipeRequest,
    responses(
        (status = 201, description = "Pipe created", body = PipeConfig),
        (status = 200, description = "Pipe updated", body = PipeConfig),
        (status = 400, description = "Invalid pipe")
    ),
    tag = "pipes"
)]
pub async fn save_pipe(
    State(state): State<AppState>,
    Json(payload): Json<SavePipeRequest>,
) -> Result<(StatusCode, Json<PipeConfig>), AppError> {
    PipeConfig::new(payload.name.trim(), payload.connector_id.trim())
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    if !state.engine.registry().contains(&payload.connector_id) {
        return Err(AppError::BadRequest(format!(
            "Unknown connector: {}",
            payload.connector_id
        )));
    }

    if let Some(id) = payload.id {
        if state.store.get_pipe(id).await?.is_some() {
            let request = payload.clone();
            let updated = state
                .store
                .upsert_pipe(id, Box::new(move |pipe| Some(request.apply(pipe))))
                .await?;
            tracing::info!(pipe_id = %id, "Pipe updated");
            return Ok((StatusCode::OK, Json(updated)));
        }
    }

    let mut pipe = PipeConfig::new(payload.name.trim(), payload.connector_id.clone());
    if let Some(id) = payload.id {
        pipe = pipe.with_id(id);
    }
    let created = state.store.save_pipe(&payload.apply(pipe)).await?;
    tracing::info!(pipe_id = %created.id, connector_id = %created.connector_id, "Pipe created");

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/pipes/{id}",
    params(
        ("id" = Uuid, Path, description = "Pipe ID")
    ),
    responses(
        (status = 200, description = "Pipe found", body = PipeConfig),
        (status = 404, description = "Pipe not found")
    ),
    tag = "pipes"
)]
pub async fn get_pipe(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipeConfig>, AppError> {
    match state.store.get_pipe(id).await? {
        Some(pipe) => Ok(Json(pipe)),
        None => Err(AppError::NotFound(format!("Pipe not found: {}", id))),
    }
}

#[utoipa::path(
    delete,
    path = "/pipes/{id}",
    params(
        ("id" = Uuid, Path, description = "Pipe ID")
    ),
    responses(
        (status = 204, description = "Pipe deleted"),
        (status = 404, description = "Pipe not found")
    ),
    tag = "pipes"
)]
pub async fn delete_pipe(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.store.delete_pipe(id).await? {
        tracing::info!(pipe_id = %id, "Pipe deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Pipe not found: {}", id)))
    }
}
