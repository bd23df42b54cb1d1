//! Debounced persistence of the editor's working copy
//!
//! Edits call [`AutosaveScheduler::schedule_autosave`]; calls inside the
//! debounce window collapse into one save carrying the latest state. While
//! the store has reported a version conflict, scheduling is a no-op until the
//! conflict is cleared.
//!
//! Saves never overlap: each one waits for the previous to settle, so the
//! base version it sends is always the newest the editor knows about.
//! Responses that arrive after a teardown or workflow switch are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::AutosaveConfig;
use crate::error::{Result, WorkflowSyncError};
use crate::events::{emit, EventSink, SyncEvent};
use crate::request::RequestTracker;
use crate::session::SharedEditorState;
use crate::store::{SaveRequest, SaveResponse, SaveSource, WorkflowStore};

/// Result of a persistence attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The store accepted the save
    Saved { version: u64 },
    /// Nothing was dirty; the store was not called
    NothingToSave,
    /// The store holds a newer version; autosave is now suspended
    Conflict { server_version: u64 },
    /// A conflict was already flagged; the store was not called
    Suppressed,
    /// The editor moved on (teardown or workflow switch) while saving
    Superseded,
}

struct PendingSave {
    generation: u64,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    store: Arc<dyn WorkflowStore>,
    state: SharedEditorState,
    config: AutosaveConfig,
    sink: Arc<dyn EventSink>,
    pending: parking_lot::Mutex<Option<PendingSave>>,
    generations: AtomicU64,
    requests: RequestTracker,
    save_lock: tokio::sync::Mutex<()>,
}

/// Debounces and serializes saves of the shared editor state
#[derive(Clone)]
pub struct AutosaveScheduler {
    inner: Arc<SchedulerInner>,
}

impl AutosaveScheduler {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        state: SharedEditorState,
        config: AutosaveConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                state,
                config,
                sink,
                pending: parking_lot::Mutex::new(None),
                generations: AtomicU64::new(0),
                requests: RequestTracker::new(),
                save_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Schedule a debounced save, replacing any pending one.
    ///
    /// Returns whether a save was scheduled. No-op while a version conflict
    /// is flagged, when nothing is dirty, or when autosave is disabled.
    /// Must be called from within a Tokio runtime.
    pub fn schedule_autosave(&self, reason: &str) -> bool {
        if !self.inner.config.enabled {
            return false;
        }
        {
            let state = self.inner.state.read();
            if state.has_version_conflict {
                log::debug!("Autosave suppressed during version conflict ({})", reason);
                return false;
            }
            if !state.dirty || state.workflow_id.is_none() {
                return false;
            }
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("Cannot schedule autosave outside of a Tokio runtime");
            return false;
        };

        let mut pending = self.inner.pending.lock();
        if let Some(previous) = pending.take() {
            previous.handle.abort();
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let delay = self.inner.config.debounce();
        log::trace!("Autosave #{} scheduled: {}", generation, reason);
        let reason = reason.to_string();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                // Only the current generation may save. Once detached from
                // `pending`, cancel can no longer reach the save.
                let mut pending = inner.pending.lock();
                if !pending.as_ref().is_some_and(|p| p.generation == generation) {
                    log::trace!("Autosave #{} replaced before firing", generation);
                    return;
                }
                pending.take();
            }
            if let Err(e) = inner.persist(SaveSource::Autosave, &reason).await {
                log::warn!("Autosave failed: {}", e);
            }
        });
        *pending = Some(PendingSave { generation, handle });
        true
    }

    /// Cancel the pending debounced save, if any
    pub fn cancel_autosave(&self) {
        if let Some(previous) = self.inner.pending.lock().take() {
            previous.handle.abort();
            log::debug!("Cancelled pending autosave #{}", previous.generation);
        }
    }

    /// Whether a debounced save is waiting to fire
    pub fn is_pending(&self) -> bool {
        self.inner
            .pending
            .lock()
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Save immediately, bypassing the debounce.
    ///
    /// Returns `NothingToSave` without calling the store when the working
    /// copy is clean, and `VersionConflict` while a conflict is flagged.
    pub async fn save_now(&self, description: &str) -> Result<SaveOutcome> {
        self.cancel_autosave();
        self.inner.persist(SaveSource::Manual, description).await
    }

    /// Set or clear the version-conflict flag.
    ///
    /// Clearing it with unsaved edits schedules one autosave.
    pub fn set_version_conflict(&self, conflicted: bool) {
        let needs_save = {
            let mut state = self.inner.state.write();
            state.has_version_conflict = conflicted;
            if !conflicted {
                state.server_version = None;
            }
            !conflicted && state.dirty
        };
        if conflicted {
            self.cancel_autosave();
        } else if needs_save {
            self.schedule_autosave("version conflict resolved");
        }
    }

    /// Cancel pending work and discard any in-flight response
    pub fn teardown(&self) {
        self.cancel_autosave();
        self.inner.requests.invalidate();
    }
}

impl SchedulerInner {
    async fn persist(&self, source: SaveSource, description: &str) -> Result<SaveOutcome> {
        let _serial = self.save_lock.lock().await;

        let (workflow_id, revision, request) = {
            let state = self.state.read();
            let Some(workflow_id) = state.workflow_id.clone() else {
                return match source {
                    SaveSource::Manual => Err(WorkflowSyncError::NoActiveWorkflow),
                    SaveSource::Autosave => Ok(SaveOutcome::NothingToSave),
                };
            };
            if state.has_version_conflict {
                return match source {
                    SaveSource::Manual => Err(WorkflowSyncError::VersionConflict {
                        workflow_id,
                        local_version: state.version,
                        server_version: state.server_version.unwrap_or(state.version),
                    }),
                    SaveSource::Autosave => Ok(SaveOutcome::Suppressed),
                };
            }
            if !state.dirty {
                return Ok(SaveOutcome::NothingToSave);
            }
            let request = SaveRequest {
                nodes: state.nodes.clone(),
                edges: state.edges.clone(),
                settings: state.settings.clone(),
                source,
                change_description: description.to_string(),
                base_version: state.version,
            };
            (workflow_id, state.revision, request)
        };

        let token = self.requests.issue();
        let base_version = request.base_version;
        let response = self.store.save(&workflow_id, request).await;

        let mut state = self.state.write();
        if !self.requests.is_latest(token) || state.workflow_id.as_deref() != Some(workflow_id.as_str()) {
            log::debug!("Discarding stale save response #{} for '{}'", token.value(), workflow_id);
            return Ok(SaveOutcome::Superseded);
        }

        match response {
            Ok(SaveResponse::Saved { version }) => {
                state.version = version;
                if state.revision == revision {
                    state.dirty = false;
                }
                drop(state);
                log::info!("Saved workflow '{}' at version {} ({:?})", workflow_id, version, source);
                emit(
                    self.sink.as_ref(),
                    SyncEvent::Saved {
                        workflow_id,
                        version,
                        source,
                    },
                );
                Ok(SaveOutcome::Saved { version })
            }
            Ok(SaveResponse::Conflict { server_version }) => {
                state.has_version_conflict = true;
                state.server_version = Some(server_version);
                drop(state);
                if let Some(previous) = self.pending.lock().take() {
                    previous.handle.abort();
                }
                log::warn!(
                    "Version conflict on '{}': local {} vs server {}",
                    workflow_id,
                    base_version,
                    server_version
                );
                emit(
                    self.sink.as_ref(),
                    SyncEvent::VersionConflict {
                        workflow_id,
                        local_version: base_version,
                        server_version,
                    },
                );
                Ok(SaveOutcome::Conflict { server_version })
            }
            Err(e) => {
                drop(state);
                log::error!("Failed to save workflow '{}': {}", workflow_id, e);
                emit(
                    self.sink.as_ref(),
                    SyncEvent::SaveFailed {
                        workflow_id,
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }
}
