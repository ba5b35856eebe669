//! Progress bus: one bounded, ordered event queue per sequencing run

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use poolshift_core::ExecutionId;
use serde::Serialize;
use futures::stream::{self, Stream};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use utoipa::ToSchema;

use crate::types::ProgressEvent;

/// Events buffered per session. The terminal event does not count against it.
pub const DEFAULT_CAPACITY: usize = 100;
/// How long a publish may wait on a full queue, while a subscriber is
/// attached, before the event is dropped
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Progress session already exists: {0}")]
    AlreadyExists(ExecutionId),

    #[error("Progress session not found: {0}")]
    NotFound(ExecutionId),

    #[error("Progress session already has a subscriber: {0}")]
    AlreadySubscribed(ExecutionId),
}

/// Descriptive data registered alongside a session's queue.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub execution_id: ExecutionId,
    pub cluster: String,
    pub origin: String,
    pub destination: String,
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(
        execution_id: ExecutionId,
        cluster: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            execution_id,
            cluster: cluster.into(),
            origin: origin.into(),
            destination: destination.into(),
            created_at: Utc::now(),
        }
    }
}

/// Snapshot of an active session, for diagnostics.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SessionSummary {
    pub session_id: ExecutionId,
    pub cluster: String,
    pub origin: String,
    pub destination: String,
    pub created_at: DateTime<Utc>,
    pub subscribed: bool,
}

struct Entry {
    info: SessionInfo,
    /// Taken by the first subscriber
    receiver: Option<mpsc::Receiver<ProgressEvent>>,
    shared: Arc<Shared>,
}

/// State seen by both ends of one session.
#[derive(Default)]
struct Shared {
    subscribed: AtomicBool,
    /// Held outside the queue so a full queue can never lose it
    terminal: Mutex<Option<ProgressEvent>>,
}

impl Shared {
    fn take_terminal(&self) -> Option<ProgressEvent> {
        self.terminal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

type Registry = Arc<RwLock<HashMap<ExecutionId, Entry>>>;

/// Registry of per-run event queues.
///
/// The map is only touched to create, subscribe and evict sessions. Publishing
/// and reading go straight through the session's channel, so runs never
/// contend on the registry lock while they emit events.
#[derive(Clone)]
pub struct ProgressBus {
    sessions: Registry,
    capacity: usize,
    publish_timeout: Duration,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Register a queue for a new run and hand back its producer side.
    pub fn create_session(&self, info: SessionInfo) -> Result<EventSink, BusError> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if sessions.contains_key(&info.execution_id) {
            return Err(BusError::AlreadyExists(info.execution_id));
        }

        let (sender, receiver) = mpsc::channel(self.capacity);
        let shared = Arc::new(Shared::default());
        let id = info.execution_id.clone();
        sessions.insert(
            id.clone(),
            Entry {
                info,
                receiver: Some(receiver),
                shared: Arc::clone(&shared),
            },
        );

        tracing::debug!(execution_id = %id, capacity = self.capacity, "Progress session created");

        Ok(EventSink {
            id,
            sender: Some(sender),
            sessions: Arc::clone(&self.sessions),
            shared,
            publish_timeout: self.publish_timeout,
            detached: false,
            finished: false,
            published: 0,
        })
    }

    /// Attach the single reader of a session.
    ///
    /// Events published before this call are still delivered, in order.
    pub fn subscribe(&self, id: &ExecutionId) -> Result<EventSource, BusError> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| BusError::NotFound(id.clone()))?;
        let receiver = entry
            .receiver
            .take()
            .ok_or_else(|| BusError::AlreadySubscribed(id.clone()))?;
        entry.shared.subscribed.store(true, Ordering::Release);

        tracing::debug!(execution_id = %id, "Progress session subscribed");

        Ok(EventSource {
            id: id.clone(),
            receiver,
            shared: Arc::clone(&entry.shared),
        })
    }

    pub fn contains(&self, id: &ExecutionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(id)
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        let sessions = self
            .sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|entry| SessionSummary {
                session_id: entry.info.execution_id.clone(),
                cluster: entry.info.cluster.clone(),
                origin: entry.info.origin.clone(),
                destination: entry.info.destination.clone(),
                created_at: entry.info.created_at,
                subscribed: entry.receiver.is_none(),
            })
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBus")
            .field("sessions", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Producer side of one session. Owned by the run that created it.
///
/// Closing or dropping the sink ends the stream for the reader and evicts the
/// session from the registry.
pub struct EventSink {
    id: ExecutionId,
    sender: Option<mpsc::Sender<ProgressEvent>>,
    sessions: Registry,
    shared: Arc<Shared>,
    publish_timeout: Duration,
    detached: bool,
    /// Set once the terminal event is in; later events are refused
    finished: bool,
    published: u64,
}

impl EventSink {
    pub fn execution_id(&self) -> &ExecutionId {
        &self.id
    }

    /// Enqueue an event.
    ///
    /// Returns whether the event was queued. The terminal event always goes
    /// through and is delivered after everything queued before it. Other
    /// events wait for queue space only while a subscriber is attached; with
    /// nobody reading, a full queue drops them at once. A reader that went
    /// away is not an error: the run keeps going and later events are
    /// discarded.
    pub async fn publish(&mut self, event: ProgressEvent) -> bool {
        if self.detached || self.finished {
            return false;
        }
        let Some(sender) = self.sender.as_ref() else {
            return false;
        };

        if event.is_terminal() {
            *self
                .shared
                .terminal
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(event);
            self.finished = true;
            self.published += 1;
            return true;
        }

        let result = if self.shared.subscribed.load(Ordering::Acquire) {
            sender.send_timeout(event, self.publish_timeout).await
        } else {
            sender.try_send(event).map_err(|e| match e {
                TrySendError::Full(event) => SendTimeoutError::Timeout(event),
                TrySendError::Closed(event) => SendTimeoutError::Closed(event),
            })
        };

        match result {
            Ok(()) => {
                self.published += 1;
                true
            }
            Err(SendTimeoutError::Closed(_)) => {
                tracing::debug!(
                    execution_id = %self.id,
                    "Progress subscriber disconnected, run continues without observer"
                );
                self.detached = true;
                false
            }
            Err(SendTimeoutError::Timeout(event)) => {
                tracing::warn!(
                    execution_id = %self.id,
                    phase = %event.phase_name,
                    "Progress queue full, dropping event"
                );
                false
            }
        }
    }

    /// Number of events queued so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// End the stream and evict the session.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
        if removed.is_some() {
            tracing::debug!(execution_id = %self.id, published = self.published, "Progress session closed");
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reader side of one session. Yields the queued events, then the terminal
/// event, then `None` once the run has closed its sink.
pub struct EventSource {
    id: ExecutionId,
    receiver: mpsc::Receiver<ProgressEvent>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource").field("id", &self.id).finish()
    }
}

impl EventSource {
    pub fn execution_id(&self) -> &ExecutionId {
        &self.id
    }

    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        match self.receiver.recv().await {
            Some(event) => Some(event),
            None => self.shared.take_terminal(),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        stream::unfold(self, |mut source| async move {
            source.recv().await.map(|event| (event, source))
        })
    }
}
