use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use events::BusError;
use fleet::FleetError;
use orchestrator::OrchestratorError;
use poolshift_core::CoreError;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug)]
pub enum AppError {
    BadRequest { code: &'static str, message: String },
    NotFound { code: &'static str, message: String },
    Conflict { code: &'static str, message: String },
    Unavailable(String),
    Fleet(FleetError),
    Internal(String),
}

impl AppError {
    pub fn missing_parameter(name: &str) -> Self {
        Self::BadRequest {
            code: "MISSING_PARAMETER",
            message: format!("{} parameter is required", name),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: "INVALID_REQUEST",
            message: message.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            AppError::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            AppError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            AppError::Unavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN", message)
            }
            AppError::Fleet(err) => match err {
                FleetError::ClusterNotFound(_) => {
                    (StatusCode::NOT_FOUND, "CLUSTER_NOT_FOUND", err.to_string())
                }
                _ => {
                    tracing::error!("Fleet error: {:?}", err);
                    (StatusCode::BAD_GATEWAY, "FLEET_ERROR", err.to_string())
                }
            },
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Validation(e) => AppError::BadRequest {
                code: e.code(),
                message: e.to_string(),
            },
            OrchestratorError::Fleet(e) => AppError::Fleet(e),
            OrchestratorError::Bus(e) => e.into(),
            OrchestratorError::ShuttingDown => AppError::Unavailable(err.to_string()),
            OrchestratorError::InvalidTransition { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl From<BusError> for AppError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::NotFound(_) => AppError::NotFound {
                code: "SESSION_NOT_FOUND",
                message: "Session not found or already completed".to_string(),
            },
            BusError::AlreadySubscribed(_) => AppError::Conflict {
                code: "ALREADY_SUBSCRIBED",
                message: "Session already has a progress subscriber".to_string(),
            },
            BusError::AlreadyExists(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::BadRequest {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<FleetError> for AppError {
    fn from(err: FleetError) -> Self {
        AppError::Fleet(err)
    }
}
