//! Progress reporting for one run.
//!
//! Wraps the run's [`EventSink`] and keeps the reported percentage from ever
//! going backwards, whatever the caller passes in.

use events::{EventSink, MigrationPhase, ProgressEvent};
use poolshift_core::ExecutionId;
use tracing::{error, info};

/// Progress at which each reported phase starts.
pub fn phase_start(phase: MigrationPhase) -> f64 {
    match phase {
        MigrationPhase::PreMigrate => 0.0,
        MigrationPhase::Cordon => 20.0,
        MigrationPhase::Evacuate => 40.0,
        MigrationPhase::PostMigrate => 75.0,
        MigrationPhase::Finalize => 90.0,
    }
}

/// Progress at which each reported phase ends.
pub fn phase_end(phase: MigrationPhase) -> f64 {
    match phase {
        MigrationPhase::PreMigrate => 20.0,
        MigrationPhase::Cordon => 40.0,
        MigrationPhase::Evacuate => 75.0,
        MigrationPhase::PostMigrate => 90.0,
        MigrationPhase::Finalize => 100.0,
    }
}

/// Progress after `done` of `total` hosts, spread evenly over `[base, base + span]`.
pub fn host_progress(base: f64, span: f64, done: usize, total: usize) -> f64 {
    if total == 0 {
        return base;
    }
    base + span * done as f64 / total as f64
}

pub struct ProgressReporter {
    sink: EventSink,
    last_percent: f64,
    last_phase: MigrationPhase,
}

impl ProgressReporter {
    pub fn new(sink: EventSink) -> Self {
        Self {
            sink,
            last_percent: 0.0,
            last_phase: MigrationPhase::PreMigrate,
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        self.sink.execution_id()
    }

    pub fn last_percent(&self) -> f64 {
        self.last_percent
    }

    /// Phase of the most recent event.
    pub fn last_phase(&self) -> MigrationPhase {
        self.last_phase
    }

    pub async fn running(&mut self, phase: MigrationPhase, message: impl Into<String>, percent: f64) {
        let event = ProgressEvent::running(phase, message, self.advance(phase, percent));
        self.emit(event).await;
    }

    pub async fn completed(
        &mut self,
        phase: MigrationPhase,
        message: impl Into<String>,
        percent: f64,
    ) {
        let event = ProgressEvent::completed(phase, message, self.advance(phase, percent));
        self.emit(event).await;
    }

    /// Publish a prepared event, clamping its progress like any other.
    pub async fn publish(&mut self, mut event: ProgressEvent) {
        event.progress_percent = self.advance(event.phase_name, event.progress_percent);
        self.emit(event).await;
    }

    /// Report a fatal failure at the last reported progress.
    pub async fn failed(
        &mut self,
        phase: MigrationPhase,
        message: impl Into<String>,
        cause: impl Into<String>,
        host: Option<(&str, u32, u32)>,
    ) {
        let mut event = ProgressEvent::error(phase, message, self.last_percent, cause);
        if let Some((name, index, total)) = host {
            event = event.with_host(name, index, total);
        }
        error!(
            execution_id = %self.sink.execution_id(),
            phase = %phase,
            host = event.host_name.as_deref().unwrap_or(""),
            error = event.error.as_deref().unwrap_or(""),
            "{}",
            event.message
        );
        self.last_phase = phase;
        self.send(event).await;
    }

    /// End the stream and evict the session.
    pub fn close(self) {
        self.sink.close();
    }

    fn advance(&mut self, phase: MigrationPhase, percent: f64) -> f64 {
        self.last_percent = self.last_percent.max(percent.clamp(0.0, 100.0));
        self.last_phase = phase;
        self.last_percent
    }

    async fn emit(&mut self, event: ProgressEvent) {
        info!(
            execution_id = %self.sink.execution_id(),
            phase = %event.phase_name,
            progress = event.progress_percent,
            host = event.host_name.as_deref().unwrap_or(""),
            "{}",
            event.message
        );
        self.send(event).await;
    }

    async fn send(&mut self, event: ProgressEvent) {
        self.sink.publish(event).await;
    }
}
