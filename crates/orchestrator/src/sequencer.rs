//! Accepts sequencing requests and supervises their runs.

use std::sync::Arc;

use events::{ProgressBus, SessionInfo};
use fleet::FleetConnector;
use poolshift_core::{ExecutionId, MigrationRequest};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::progress::ProgressReporter;
use crate::runner::{PhaseRunner, RunOutcome};

/// What a caller learns about an accepted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub execution_id: ExecutionId,
    pub cluster: String,
    pub origin: String,
    pub destination: String,
}

/// Handle to a run started by [`SequencingOrchestrator::submit`].
///
/// Dropping the handle detaches the run; it keeps going in the background.
#[derive(Debug)]
pub struct RunHandle {
    submission: Submission,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn execution_id(&self) -> &ExecutionId {
        &self.submission.execution_id
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    /// Let the run continue on its own and keep only its description.
    pub fn detach(self) -> Submission {
        self.submission
    }

    /// Wait for the run to end. `None` if its task panicked.
    pub async fn wait(self) -> Option<RunOutcome> {
        match self.task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(execution_id = %self.submission.execution_id, error = %e, "Sequencing run task failed");
                None
            }
        }
    }
}

/// Entry point for sequencing runs.
///
/// Each accepted request gets its own task and its own progress session.
/// Runs share nothing but the bus registry.
#[derive(Clone)]
pub struct SequencingOrchestrator {
    bus: ProgressBus,
    connector: Arc<dyn FleetConnector>,
    config: OrchestratorConfig,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl SequencingOrchestrator {
    pub fn new(connector: Arc<dyn FleetConnector>, config: OrchestratorConfig) -> Self {
        let bus = ProgressBus::with_capacity(config.event_buffer)
            .with_publish_timeout(config.publish_timeout);
        Self::with_bus(bus, connector, config)
    }

    pub fn with_bus(
        bus: ProgressBus,
        connector: Arc<dyn FleetConnector>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            bus,
            connector,
            config,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    pub fn connector(&self) -> &Arc<dyn FleetConnector> {
        &self.connector
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs still in flight.
    pub fn active_runs(&self) -> usize {
        self.tracker.len()
    }

    /// Validate a request, bind its cluster and start the run.
    ///
    /// Returns as soon as the run's progress session exists. Nothing is
    /// registered when validation or the cluster connection fails.
    pub async fn submit(&self, request: MigrationRequest) -> Result<RunHandle> {
        if self.cancel.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let plan = request.validate()?;
        let collaborators = self.connector.connect(&plan.cluster_id).await?;

        let execution_id = ExecutionId::generate(&plan.cluster_id);
        let submission = Submission {
            execution_id: execution_id.clone(),
            cluster: plan.cluster_id.clone(),
            origin: plan.origin.name.clone(),
            destination: plan.destination.name.clone(),
        };

        let sink = self.bus.create_session(SessionInfo::new(
            execution_id.clone(),
            &submission.cluster,
            &submission.origin,
            &submission.destination,
        ))?;

        let runner = PhaseRunner::new(
            plan,
            collaborators,
            &self.config,
            self.cancel.child_token(),
            ProgressReporter::new(sink),
        );
        let task = self.tracker.spawn(runner.run());

        info!(
            execution_id = %execution_id,
            cluster = %submission.cluster,
            origin = %submission.origin,
            destination = %submission.destination,
            "Sequencing run accepted"
        );

        Ok(RunHandle { submission, task })
    }

    /// Stop accepting runs, cancel the ones in flight and wait for them to
    /// publish their final event.
    pub async fn shutdown(&self) {
        let active = self.tracker.len();
        if active > 0 {
            info!(active, "Cancelling in-flight sequencing runs");
        }
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
