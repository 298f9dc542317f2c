use axum::extract::State;
use axum::Json;
use orchestrator::ConnectorInfo;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/connectors",
    responses(
        (status = 200, description = "Registered connectors", body = Vec<ConnectorInfo>)
    ),
    tag = "connectors"
)]
pub async fn list_connectors(State(state): State<AppState>) -> Json<Vec<ConnectorInfo>> {
    Json(state.engine.registry().list())
}
