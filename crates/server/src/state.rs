use std::sync::Arc;

use events::ProgressBus;
use fleet::FleetConnector;
use orchestrator::{OrchestratorConfig, SequencingOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: SequencingOrchestrator,
}

impl AppState {
    pub fn new(connector: Arc<dyn FleetConnector>, config: OrchestratorConfig) -> Self {
        Self {
            orchestrator: SequencingOrchestrator::new(connector, config),
        }
    }

    pub fn bus(&self) -> &ProgressBus {
        self.orchestrator.bus()
    }

    pub fn connector(&self) -> &Arc<dyn FleetConnector> {
        self.orchestrator.connector()
    }
}
