use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use events::{ProgressEvent, SessionSummary};
use futures::stream::{self, Stream, StreamExt};
use poolshift_core::{ExecutionId, MigrationRequest};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::state::AppState;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const PHASE_COUNT: u8 = 5;

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SequenceStarted {
    pub cluster: String,
    pub origin: String,
    pub dest: String,
    pub phases: u8,
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ExecuteResponse {
    pub success: bool,
    pub message: String,
    pub data: SequenceStarted,
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SessionsResponse {
    pub success: bool,
    pub data: Vec<SessionSummary>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProgressQuery {
    /// Id returned when the sequence was started
    pub session_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/nodepools/sequence/execute",
    request_body = MigrationRequest,
    responses(
        (status = 202, description = "Sequencing started", body = ExecuteResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Cluster not found", body = crate::error::ErrorResponse),
        (status = 502, description = "Cluster connection failed", body = crate::error::ErrorResponse)
    ),
    tag = "sequence"
)]
pub async fn execute_sequence(
    State(state): State<AppState>,
    payload: Result<Json<MigrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ExecuteResponse>), AppError> {
    let Json(request) = payload
        .map_err(|e| AppError::invalid_request(format!("Invalid request body: {}", e.body_text())))?;

    let submission = state.orchestrator.submit(request).await?.detach();

    Ok((
        StatusCode::ACCEPTED,
        Json(ExecuteResponse {
            success: true,
            message: "Sequencing started".to_string(),
            data: SequenceStarted {
                cluster: submission.cluster,
                origin: submission.origin,
                dest: submission.destination,
                phases: PHASE_COUNT,
                session_id: submission.execution_id.to_string(),
            },
        }),
    ))
}

fn progress_to_sse_event(event: &ProgressEvent) -> Result<Event, Infallible> {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Ok(Event::default().event("progress").data(data))
}

fn close_event() -> Result<Event, Infallible> {
    Ok(Event::default()
        .event("close")
        .data(r#"{"message":"Sequencing completed"}"#))
}

#[utoipa::path(
    get,
    path = "/api/v1/nodepools/sequence/progress",
    params(ProgressQuery),
    responses(
        (status = 200, description = "SSE stream of progress events, ended by a close event"),
        (status = 400, description = "Missing session_id", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or finished session", body = crate::error::ErrorResponse),
        (status = 409, description = "Session already has a subscriber", body = crate::error::ErrorResponse)
    ),
    tag = "sequence"
)]
pub async fn sequence_progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session_id = query
        .session_id
        .filter(|id| !id.is_empty())
        .map(ExecutionId::from)
        .ok_or_else(|| AppError::missing_parameter("session_id"))?;

    let source = state.bus().subscribe(&session_id)?;
    tracing::info!(execution_id = %session_id, "Progress stream attached");

    let stream = source
        .into_stream()
        .map(|event| progress_to_sse_event(&event))
        .chain(stream::once(async { close_event() }));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/nodepools/sequence/sessions",
    responses(
        (status = 200, description = "Sequencing sessions still open", body = SessionsResponse)
    ),
    tag = "sequence"
)]
pub async fn list_sequence_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        success: true,
        data: state.bus().sessions(),
    })
}
