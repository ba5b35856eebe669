//! Event types published while a sequencing run advances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The five reported phases of a run.
///
/// The ready wait is reported under `PreMigrate`, since it belongs to the
/// scale-up half of the workflow from an observer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationPhase {
    PreMigrate,
    Cordon,
    Evacuate,
    PostMigrate,
    Finalize,
}

impl MigrationPhase {
    pub const ALL: [MigrationPhase; 5] = [
        Self::PreMigrate,
        Self::Cordon,
        Self::Evacuate,
        Self::PostMigrate,
        Self::Finalize,
    ];

    /// 1-based phase number as shown to observers.
    pub fn number(&self) -> u8 {
        match self {
            Self::PreMigrate => 1,
            Self::Cordon => 2,
            Self::Evacuate => 3,
            Self::PostMigrate => 4,
            Self::Finalize => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreMigrate => "PRE_MIGRATE",
            Self::Cordon => "CORDON",
            Self::Evacuate => "EVACUATE",
            Self::PostMigrate => "POST_MIGRATE",
            Self::Finalize => "FINALIZE",
        }
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Running,
    Completed,
    Error,
}

/// One immutable fact about a run's advancement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ProgressEvent {
    /// Phase number, 1 through 5
    pub phase: u8,
    pub phase_name: MigrationPhase,
    pub status: EventStatus,
    pub message: String,
    /// Overall progress, 0 to 100
    #[serde(rename = "progress")]
    pub progress_percent: f64,
    #[serde(rename = "node_name", default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    /// 1-based position of the host within its batch
    #[serde(rename = "node_index", default, skip_serializing_if = "Option::is_none")]
    pub host_index: Option<u32>,
    #[serde(rename = "node_total", default, skip_serializing_if = "Option::is_none")]
    pub host_total: Option<u32>,
    pub timestamp: DateTime<Utc>,
    /// Present iff `status` is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    fn new(
        phase: MigrationPhase,
        status: EventStatus,
        message: impl Into<String>,
        progress_percent: f64,
    ) -> Self {
        Self {
            phase: phase.number(),
            phase_name: phase,
            status,
            message: message.into(),
            progress_percent: progress_percent.clamp(0.0, 100.0),
            host_name: None,
            host_index: None,
            host_total: None,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn running(phase: MigrationPhase, message: impl Into<String>, progress: f64) -> Self {
        Self::new(phase, EventStatus::Running, message, progress)
    }

    pub fn completed(phase: MigrationPhase, message: impl Into<String>, progress: f64) -> Self {
        Self::new(phase, EventStatus::Completed, message, progress)
    }

    pub fn error(
        phase: MigrationPhase,
        message: impl Into<String>,
        progress: f64,
        error: impl Into<String>,
    ) -> Self {
        let mut event = Self::new(phase, EventStatus::Error, message, progress);
        event.error = Some(error.into());
        event
    }

    /// Attach the host this event is about.
    pub fn with_host(mut self, name: impl Into<String>, index: u32, total: u32) -> Self {
        self.host_name = Some(name.into());
        self.host_index = Some(index);
        self.host_total = Some(total);
        self
    }

    /// Report a batch size without naming a specific host.
    pub fn with_host_total(mut self, total: u32) -> Self {
        self.host_total = Some(total);
        self
    }

    pub fn is_terminal(&self) -> bool {
        match self.status {
            EventStatus::Error => true,
            EventStatus::Completed => self.phase_name == MigrationPhase::Finalize,
            EventStatus::Running => false,
        }
    }
}
