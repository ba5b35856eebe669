//! Drives one sequencing run through its phases.

use std::time::Duration;

use events::{MigrationPhase, ProgressEvent};
use fleet::{Collaborators, PoolTarget};
use poolshift_core::{CapacitySpec, ExecutionSession, MigrationPlan, PhaseState, PoolSpec};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::progress::{host_progress, phase_end, phase_start, ProgressReporter};
use crate::state_machine::PhaseStateMachine;

const CANCELLED: &str = "cancelled: service shutting down";

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        duration: Duration,
    },
    Failed {
        phase: MigrationPhase,
        host: Option<String>,
        error: String,
    },
    Cancelled {
        phase: MigrationPhase,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Why a run stopped before finishing.
#[derive(Debug)]
enum Abort {
    Failed {
        phase: MigrationPhase,
        message: String,
        cause: String,
        host: Option<(String, u32, u32)>,
    },
    Cancelled(MigrationPhase),
}

impl Abort {
    fn failed(phase: MigrationPhase, message: impl Into<String>, cause: impl ToString) -> Self {
        Self::Failed {
            phase,
            message: message.into(),
            cause: cause.to_string(),
            host: None,
        }
    }

    fn on_host(self, name: &str, index: u32, total: u32) -> Self {
        match self {
            Self::Failed {
                phase,
                message,
                cause,
                ..
            } => Self::Failed {
                phase,
                message,
                cause,
                host: Some((name.to_string(), index, total)),
            },
            other => other,
        }
    }
}

type Step<T = ()> = std::result::Result<T, Abort>;

/// Owns the state of one run: the session, its event sink and the
/// collaborators bound to its cluster.
pub struct PhaseRunner {
    plan: MigrationPlan,
    collaborators: Collaborators,
    ready_wait: Duration,
    cancel: CancellationToken,
    session: ExecutionSession,
    reporter: ProgressReporter,
    pre_migration_skipped: bool,
}

impl PhaseRunner {
    pub fn new(
        plan: MigrationPlan,
        collaborators: Collaborators,
        config: &OrchestratorConfig,
        cancel: CancellationToken,
        reporter: ProgressReporter,
    ) -> Self {
        let session = ExecutionSession::new(reporter.execution_id().clone());
        Self {
            plan,
            collaborators,
            ready_wait: config.ready_wait,
            cancel,
            session,
            reporter,
            pre_migration_skipped: false,
        }
    }

    /// Run every phase, publish the terminal event and close the stream.
    pub async fn run(mut self) -> RunOutcome {
        let started = Instant::now();
        info!(
            execution_id = %self.session.id,
            cluster = %self.plan.cluster_id,
            origin = %self.plan.origin.name,
            destination = %self.plan.destination.name,
            "Sequencing run started"
        );

        let outcome = match self.execute(started).await {
            Ok(duration) => RunOutcome::Completed { duration },
            Err(abort) => self.abort(abort).await,
        };

        info!(
            execution_id = %self.session.id,
            phase = %self.session.phase,
            outcome = ?outcome,
            "Sequencing run finished"
        );
        self.reporter.close();
        outcome
    }

    async fn execute(&mut self, started: Instant) -> Step<Duration> {
        self.pre_migrate().await?;
        self.enter(PhaseState::ReadyWait, MigrationPhase::PreMigrate)?;
        self.ready_wait().await?;
        self.enter(PhaseState::Cordon, MigrationPhase::Cordon)?;
        self.cordon().await?;
        self.enter(PhaseState::Evacuate, MigrationPhase::Evacuate)?;
        self.evacuate().await?;
        self.enter(PhaseState::PostMigrate, MigrationPhase::PostMigrate)?;
        self.post_migrate().await?;
        self.enter(PhaseState::Finalize, MigrationPhase::Finalize)?;
        Ok(self.finalize(started).await)
    }

    fn enter(&mut self, next: PhaseState, reported: MigrationPhase) -> Step {
        PhaseStateMachine::validate_transition(&self.session.phase, &next)
            .map_err(|e| Abort::failed(reported, "Internal sequencing error", e))?;
        self.session.enter(next);
        Ok(())
    }

    /// Stop here if the service is shutting down.
    fn checkpoint(&self, phase: MigrationPhase) -> Step {
        if self.cancel.is_cancelled() {
            return Err(Abort::Cancelled(phase));
        }
        Ok(())
    }

    async fn pre_migrate(&mut self) -> Step {
        let phase = MigrationPhase::PreMigrate;
        let destination = self.plan.destination.clone();

        self.reporter
            .running(phase, "Starting PRE_MIGRATE phase", phase_start(phase))
            .await;

        match destination.pre_migration_capacity {
            Some(capacity) => {
                self.reporter
                    .running(
                        phase,
                        format!(
                            "Applying pre-drain changes to {}: {}",
                            destination.name,
                            capacity.describe()
                        ),
                        5.0,
                    )
                    .await;
                self.apply_capacity(phase, &destination, &capacity, "pre-drain")
                    .await?;
                self.reporter
                    .running(
                        phase,
                        format!("Pre-drain changes applied to {}", destination.name),
                        10.0,
                    )
                    .await;
            }
            None => {
                self.pre_migration_skipped = true;
                self.reporter
                    .running(
                        phase,
                        format!(
                            "No pre-drain changes for {}, skipping capacity change",
                            destination.name
                        ),
                        10.0,
                    )
                    .await;
            }
        }
        Ok(())
    }

    async fn ready_wait(&mut self) -> Step {
        let phase = MigrationPhase::PreMigrate;
        self.reporter
            .running(
                phase,
                format!(
                    "Waiting {}s for new nodes to become ready",
                    self.ready_wait.as_secs()
                ),
                15.0,
            )
            .await;

        tokio::select! {
            _ = self.cancel.cancelled() => return Err(Abort::Cancelled(phase)),
            _ = tokio::time::sleep(self.ready_wait) => {}
        }

        let message = if self.pre_migration_skipped {
            "PRE_MIGRATE phase skipped (no pre-drain changes)"
        } else {
            "PRE_MIGRATE phase completed"
        };
        self.reporter.completed(phase, message, phase_end(phase)).await;
        Ok(())
    }

    async fn cordon(&mut self) -> Step {
        let phase = MigrationPhase::Cordon;
        if !self.plan.cordon_enabled {
            self.reporter
                .completed(phase, "CORDON phase skipped (disabled)", phase_end(phase))
                .await;
            return Ok(());
        }

        self.reporter
            .running(phase, "Starting CORDON phase", phase_start(phase))
            .await;
        let hosts = self.list_hosts(phase, 22.0).await?;
        let total = count(&hosts);

        self.reporter
            .publish(
                ProgressEvent::running(
                    phase,
                    format!("Found {} nodes to cordon", total),
                    25.0,
                )
                .with_host_total(total),
            )
            .await;

        for (i, host) in hosts.iter().enumerate() {
            let index = i as u32 + 1;
            self.checkpoint(phase)?;
            self.collaborators.evacuator.cordon(host).await.map_err(|e| {
                Abort::failed(phase, format!("Failed to cordon node {}", host), e)
                    .on_host(host, index, total)
            })?;

            self.reporter
                .publish(
                    ProgressEvent::running(
                        phase,
                        format!("Cordoned node {} ({}/{})", host, index, total),
                        host_progress(25.0, 15.0, i + 1, hosts.len()),
                    )
                    .with_host(host.as_str(), index, total),
                )
                .await;
        }

        self.reporter
            .completed(
                phase,
                format!("CORDON phase completed: {} nodes cordoned", total),
                phase_end(phase),
            )
            .await;
        Ok(())
    }

    async fn evacuate(&mut self) -> Step {
        let phase = MigrationPhase::Evacuate;
        if !self.plan.evacuation_enabled {
            self.reporter
                .completed(phase, "EVACUATE phase skipped (disabled)", phase_end(phase))
                .await;
            return Ok(());
        }

        self.reporter
            .running(phase, "Starting EVACUATE phase", phase_start(phase))
            .await;
        // Membership may have changed since cordoning, so enumerate again.
        let hosts = self.list_hosts(phase, 42.0).await?;
        let total = count(&hosts);
        let options = self.plan.evacuation_options.clone();

        self.reporter
            .publish(
                ProgressEvent::running(
                    phase,
                    format!(
                        "Draining {} nodes (grace period {}s, timeout {}s, chunk size {})",
                        total, options.grace_period, options.timeout, options.chunk_size
                    ),
                    45.0,
                )
                .with_host_total(total),
            )
            .await;

        for (i, host) in hosts.iter().enumerate() {
            let index = i as u32 + 1;
            self.checkpoint(phase)?;
            self.collaborators
                .evacuator
                .evict(host, &options)
                .await
                .map_err(|e| {
                    Abort::failed(phase, format!("Failed to drain node {}", host), e)
                        .on_host(host, index, total)
                })?;

            self.checkpoint(phase)?;
            let message = match self.collaborators.evacuator.is_fully_evacuated(host).await {
                Ok(true) => format!("Node {} fully drained", host),
                Ok(false) => {
                    warn!(execution_id = %self.session.id, host = %host, "Drain incomplete");
                    format!("Warning: node {} still has workloads after drain", host)
                }
                Err(e) => {
                    warn!(
                        execution_id = %self.session.id,
                        host = %host,
                        error = %e,
                        "Drain verification failed"
                    );
                    format!("Warning: could not verify drain of node {}: {}", host, e)
                }
            };

            self.reporter
                .publish(
                    ProgressEvent::running(
                        phase,
                        message,
                        host_progress(45.0, 30.0, i + 1, hosts.len()),
                    )
                    .with_host(host.as_str(), index, total),
                )
                .await;
        }

        self.reporter
            .completed(
                phase,
                format!("EVACUATE phase completed: {} nodes drained", total),
                phase_end(phase),
            )
            .await;
        Ok(())
    }

    async fn post_migrate(&mut self) -> Step {
        let phase = MigrationPhase::PostMigrate;
        let origin = self.plan.origin.clone();

        self.reporter
            .running(phase, "Starting POST_MIGRATE phase", phase_start(phase))
            .await;

        let Some(capacity) = origin.post_migration_capacity else {
            self.reporter
                .completed(
                    phase,
                    "POST_MIGRATE phase skipped (no post-drain changes)",
                    phase_end(phase),
                )
                .await;
            return Ok(());
        };

        self.reporter
            .running(
                phase,
                format!(
                    "Applying post-drain changes to {}: {}",
                    origin.name,
                    capacity.describe()
                ),
                80.0,
            )
            .await;
        self.apply_capacity(phase, &origin, &capacity, "post-drain")
            .await?;
        self.reporter
            .completed(phase, "POST_MIGRATE phase completed", phase_end(phase))
            .await;
        Ok(())
    }

    async fn finalize(&mut self, started: Instant) -> Duration {
        let phase = MigrationPhase::Finalize;
        self.reporter
            .running(phase, "Finalizing sequencing", phase_start(phase))
            .await;

        let duration = started.elapsed();
        self.reporter
            .completed(
                phase,
                format!(
                    "Sequencing completed successfully in {:.1}s",
                    duration.as_secs_f64()
                ),
                phase_end(phase),
            )
            .await;
        duration
    }

    async fn apply_capacity(
        &mut self,
        phase: MigrationPhase,
        pool: &PoolSpec,
        capacity: &CapacitySpec,
        label: &str,
    ) -> Step {
        self.checkpoint(phase)?;
        let target = PoolTarget::for_pool(&self.collaborators.cluster_name, pool);
        self.collaborators
            .capacity
            .apply_capacity(&target, capacity)
            .await
            .map_err(|e| {
                Abort::failed(
                    phase,
                    format!("Failed to apply {} changes to {}", label, pool.name),
                    e,
                )
            })
    }

    async fn list_hosts(&mut self, phase: MigrationPhase, percent: f64) -> Step<Vec<String>> {
        let pool = self.plan.origin.name.clone();
        self.reporter
            .running(phase, format!("Listing nodes in pool {}", pool), percent)
            .await;

        self.checkpoint(phase)?;
        self.collaborators
            .evacuator
            .list_hosts(&pool)
            .await
            .map_err(|e| Abort::failed(phase, format!("Failed to list nodes in pool {}", pool), e))
    }

    async fn abort(&mut self, abort: Abort) -> RunOutcome {
        if PhaseStateMachine::validate_transition(&self.session.phase, &PhaseState::Error).is_ok() {
            self.session.enter(PhaseState::Error);
        }

        match abort {
            Abort::Failed {
                phase,
                message,
                cause,
                host,
            } => {
                self.reporter
                    .failed(
                        phase,
                        message,
                        cause.clone(),
                        host.as_ref().map(|(name, i, n)| (name.as_str(), *i, *n)),
                    )
                    .await;
                RunOutcome::Failed {
                    phase,
                    host: host.map(|(name, _, _)| name),
                    error: cause,
                }
            }
            Abort::Cancelled(phase) => {
                self.reporter.failed(phase, CANCELLED, CANCELLED, None).await;
                RunOutcome::Cancelled { phase }
            }
        }
    }
}

fn count(hosts: &[String]) -> u32 {
    u32::try_from(hosts.len()).unwrap_or(u32::MAX)
}
