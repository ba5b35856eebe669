pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Poolshift API",
        version = "0.1.0",
        description = "Sequenced node pool migrations for AKS clusters"
    ),
    paths(
        routes::health_check,
        routes::sequence::execute_sequence,
        routes::sequence::sequence_progress,
        routes::sequence::list_sequence_sessions,
        routes::nodepools::list_node_pools,
        routes::nodepools::update_node_pool,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::sequence::ExecuteResponse,
        routes::sequence::SequenceStarted,
        routes::sequence::SessionsResponse,
        routes::nodepools::NodePoolsResponse,
        routes::nodepools::NodePoolResponse,
        routes::nodepools::UpdateNodePoolRequest,
        error::ErrorResponse,
        error::ErrorDetail,
        poolshift_core::MigrationRequest,
        poolshift_core::PoolSpec,
        poolshift_core::CapacitySpec,
        poolshift_core::EvacuationOptions,
        events::ProgressEvent,
        events::MigrationPhase,
        events::EventStatus,
        events::SessionSummary,
        fleet::NodePoolInfo,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sequence", description = "Node pool sequencing runs and their progress (SSE)"),
        (name = "nodepools", description = "Node pool inventory and single pool updates"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route(
            "/api/v1/nodepools",
            get(routes::nodepools::list_node_pools),
        )
        .route(
            "/api/v1/nodepools/{cluster}/{resource_group}/{name}",
            put(routes::nodepools::update_node_pool),
        )
        .route(
            "/api/v1/nodepools/sequence/execute",
            post(routes::sequence::execute_sequence),
        )
        .route(
            "/api/v1/nodepools/sequence/progress",
            get(routes::sequence::sequence_progress),
        )
        .route(
            "/api/v1/nodepools/sequence/sessions",
            get(routes::sequence::list_sequence_sessions),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
