pub mod config;
pub mod error;
pub mod progress;
pub mod runner;
pub mod sequencer;
pub mod state_machine;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use runner::{PhaseRunner, RunOutcome};
pub use sequencer::{RunHandle, SequencingOrchestrator, Submission};
pub use state_machine::PhaseStateMachine;
