pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Data Pipes API",
        version = "0.1.0",
        description = "Manage data pipes and follow their runs"
    ),
    paths(
        routes::health_check,
        routes::list_connectors,
        routes::list_pipes,
        routes::save_pipe,
        routes::get_pipe,
        routes::delete_pipe,
        routes::list_recent_runs,
        routes::list_pipe_runs,
        routes::start_run,
        routes::get_run_log,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::SavePipeRequest,
        routes::RunView,
        routes::StartRunResponse,
        orchestrator::ConnectorInfo,
        pipes_core::PipeConfig,
        pipes_core::SourceTable,
        pipes_core::RunDocument,
        pipes_core::RunStatus,
        pipes_core::StepStats,
        pipes_core::StepStatus,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "connectors", description = "Registered connectors"),
        (name = "pipes", description = "Pipe configuration endpoints"),
        (name = "runs", description = "Pipe run endpoints"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route("/connectors", get(routes::list_connectors))
        .route("/pipes", get(routes::list_pipes).post(routes::save_pipe))
        .route(
            "/pipes/{id}",
            get(routes::get_pipe).delete(routes::delete_pipe),
        )
        .route("/runs", get(routes::list_recent_runs))
        .route(
            "/runs/{id}",
            get(routes::list_pipe_runs).post(routes::start_run),
        )
        .route("/runs/{id}/log", get(routes::get_run_log))
        .route("/ws/runs", get(routes::run_updates_socket))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
