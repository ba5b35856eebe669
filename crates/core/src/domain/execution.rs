use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identifier of one sequencing run, `<cluster>_<unix nanos>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(transparent)]
pub struct ExecutionId(String);

static LAST_NANOS: AtomicU64 = AtomicU64::new(0);

impl ExecutionId {
    /// Generate a fresh id for a run against `cluster`.
    ///
    /// The timestamp part is forced to be strictly increasing within the
    /// process, so two runs submitted in the same clock tick never collide.
    pub fn generate(cluster: &str) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let mut last = LAST_NANOS.load(Ordering::Relaxed);
        let nanos = loop {
            let candidate = now.max(last + 1);
            match LAST_NANOS.compare_exchange_weak(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => break candidate,
                Err(actual) => last = actual,
            }
        };

        Self(format!("{}_{}", cluster, nanos))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a run currently is in the sequencing workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    #[default]
    PreMigrate,
    /// Fixed wait for new capacity to become schedulable
    ReadyWait,
    Cordon,
    Evacuate,
    PostMigrate,
    Finalize,
    Error,
}

impl PhaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreMigrate => "PRE_MIGRATE",
            Self::ReadyWait => "READY_WAIT",
            Self::Cordon => "CORDON",
            Self::Evacuate => "EVACUATE",
            Self::PostMigrate => "POST_MIGRATE",
            Self::Finalize => "FINALIZE",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRE_MIGRATE" => Some(Self::PreMigrate),
            "READY_WAIT" => Some(Self::ReadyWait),
            "CORDON" => Some(Self::Cordon),
            "EVACUATE" => Some(Self::Evacuate),
            "POST_MIGRATE" => Some(Self::PostMigrate),
            "FINALIZE" => Some(Self::Finalize),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalize | Self::Error)
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state of one run, owned by the task driving it.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ExecutionSession {
    pub id: ExecutionId,
    pub phase: PhaseState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionSession {
    pub fn new(id: ExecutionId) -> Self {
        Self {
            id,
            phase: PhaseState::default(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to `phase`. Callers are expected to have validated the transition.
    pub fn enter(&mut self, phase: PhaseState) {
        self.phase = phase;
        if phase.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }
}
