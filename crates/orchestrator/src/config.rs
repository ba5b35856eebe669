use std::time::Duration;

use events::{DEFAULT_CAPACITY, DEFAULT_PUBLISH_TIMEOUT};

/// Fixed wait after scaling up, before hosts are cordoned
pub const DEFAULT_READY_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub ready_wait: Duration,
    /// Events buffered per run before publishing waits
    pub event_buffer: usize,
    pub publish_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ready_wait: DEFAULT_READY_WAIT,
            event_buffer: DEFAULT_CAPACITY,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_ready_wait(mut self, ready_wait: Duration) -> Self {
        self.ready_wait = ready_wait;
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    pub fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }
}
