use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Sequencing requires exactly 2 node pools, got {0}")]
    InvalidPoolCount(usize),

    #[error("Invalid drain options: {0}")]
    InvalidDrainOptions(String),

    #[error("Drain enabled requires Cordon to be enabled")]
    DrainRequiresCordon,

    #[error("Node pools must use distinct sequence orders 1 and 2, got {first} and {second}")]
    InvalidSequenceOrder { first: u8, second: u8 },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl CoreError {
    /// Stable machine-readable code reported to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPoolCount(_) => "INVALID_NODE_POOLS",
            Self::InvalidDrainOptions(_) => "INVALID_DRAIN_OPTIONS",
            Self::DrainRequiresCordon => "DRAIN_REQUIRES_CORDON",
            Self::InvalidSequenceOrder { .. } => "INVALID_SEQUENCE_ORDER",
            Self::Validation(_) => "INVALID_REQUEST",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
