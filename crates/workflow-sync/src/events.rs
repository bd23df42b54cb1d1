//! Events reported by the editor core
//!
//! Events flow from the engine to whatever hosts it (a UI bridge, a test
//! harness) to report saves, conflicts, validation results and mode
//! changes.

use serde::{Deserialize, Serialize};

use crate::store::SaveSource;
use crate::types::{Issue, WorkflowValidationResult};

/// Trait for sending sync events
///
/// This abstracts over the transport mechanism (UI channel, mpsc, etc.)
/// so the engine can be hosted in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: SyncEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Which editing surface is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorMode {
    /// Node-graph canvas
    #[default]
    Visual,
    /// Raw JSON text
    Code,
}

/// Events emitted by the editor core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// A workflow was loaded from the store
    #[serde(rename_all = "camelCase")]
    Loaded { workflow_id: String, version: u64 },

    /// A save completed
    #[serde(rename_all = "camelCase")]
    Saved {
        workflow_id: String,
        version: u64,
        source: SaveSource,
    },

    /// A save failed for a reason other than a version conflict
    #[serde(rename_all = "camelCase")]
    SaveFailed { workflow_id: String, error: String },

    /// The store reported the local copy is stale; autosave is suspended
    #[serde(rename_all = "camelCase")]
    VersionConflict {
        workflow_id: String,
        local_version: u64,
        server_version: u64,
    },

    /// A validation run finished and was not superseded
    #[serde(rename_all = "camelCase")]
    ValidationCompleted { result: WorkflowValidationResult },

    /// Code-mode text was adopted into the graph
    #[serde(rename_all = "camelCase")]
    AdoptedFromText { warnings: Vec<Issue> },

    /// The active editing surface changed
    #[serde(rename_all = "camelCase")]
    ModeChanged { mode: EditorMode },

    /// Leaving code mode was refused because the text did not adopt
    #[serde(rename_all = "camelCase")]
    TransitionBlocked { errors: Vec<Issue> },
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: SyncEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<SyncEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: SyncEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Send an event, logging (not propagating) sink failures
pub(crate) fn emit(sink: &dyn EventSink, event: SyncEvent) {
    if let Err(e) = sink.send(event) {
        log::warn!("Dropping sync event: {}", e);
    }
}
