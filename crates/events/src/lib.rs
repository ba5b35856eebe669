//! Progress events for sequencing runs
//!
//! This crate provides the event model published by the orchestrator and the
//! per-run progress bus that buffers those events until an observer reads them.

mod bus;
mod types;

pub use bus::{
    BusError, EventSink, EventSource, ProgressBus, SessionInfo, SessionSummary, DEFAULT_CAPACITY,
    DEFAULT_PUBLISH_TIMEOUT,
};
pub use types::*;
