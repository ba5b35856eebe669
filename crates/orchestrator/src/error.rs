use events::BusError;
use fleet::FleetError;
use poolshift_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("Cluster connection failed: {0}")]
    Fleet(#[from] FleetError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Orchestrator is shutting down, no new runs are accepted")]
    ShuttingDown,
}

impl OrchestratorError {
    /// Whether the caller sent a bad request, as opposed to a server side
    /// failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
