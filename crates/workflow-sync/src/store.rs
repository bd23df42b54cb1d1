//! Versioned workflow storage
//!
//! The store owns the authoritative copy of every workflow. Saves carry the
//! version the editor last saw; a save against a stale version is answered
//! with a conflict instead of overwriting newer data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, WorkflowSyncError};
use crate::types::{Edge, Node, WorkflowDefinition, WorkflowSettings};

/// What triggered a save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveSource {
    Autosave,
    Manual,
}

/// Payload sent to [`WorkflowStore::save`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<WorkflowSettings>,
    pub source: SaveSource,
    pub change_description: String,
    /// Version the editor's working copy was based on
    pub base_version: u64,
}

/// Store reply to a save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SaveResponse {
    /// Accepted; `version` is the new server version
    Saved { version: u64 },
    /// Rejected because the server holds a newer version
    #[serde(rename_all = "camelCase")]
    Conflict { server_version: u64 },
}

/// A workflow as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWorkflow {
    pub id: String,
    pub version: u64,
    #[serde(flatten)]
    pub definition: WorkflowDefinition,
    pub updated_at: DateTime<Utc>,
}

impl StoredWorkflow {
    /// A fresh workflow at version 1
    pub fn new(id: impl Into<String>, definition: WorkflowDefinition) -> Self {
        Self {
            id: id.into(),
            version: 1,
            definition,
            updated_at: Utc::now(),
        }
    }
}

/// Summary row for listing stored workflows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    /// `metadata.name`, when present
    pub name: Option<String>,
    pub version: u64,
    pub node_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Persistent source of truth for workflow definitions
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Load the current server copy
    async fn load(&self, workflow_id: &str) -> Result<StoredWorkflow>;

    /// Save a working copy. Stale `base_version`s yield
    /// [`SaveResponse::Conflict`] rather than an error.
    async fn save(&self, workflow_id: &str, request: SaveRequest) -> Result<SaveResponse>;
}

/// In-memory workflow store with optional file persistence.
///
/// Each workflow is written to `<dir>/<id>.json` when persistence is on.
///
/// # Example
///
/// ```ignore
/// let store = MemoryWorkflowStore::with_persistence(".workflows");
/// let count = store.load_from_disk().await?;
/// log::info!("Loaded {} workflows", count);
/// ```
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<String, StoredWorkflow>>,
    persist_path: Option<PathBuf>,
    latency: Option<Duration>,
    unavailable: AtomicBool,
    save_calls: AtomicUsize,
    save_lock: tokio::sync::Mutex<()>,
}

impl MemoryWorkflowStore {
    /// Create a store without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists to the given directory.
    ///
    /// The directory is created on first write.
    pub fn with_persistence(path: impl AsRef<Path>) -> Self {
        Self {
            persist_path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Delay every save by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Load every `*.json` workflow from the persistence directory.
    ///
    /// Returns the number of workflows loaded; unparseable files are skipped.
    pub async fn load_from_disk(&self) -> Result<usize> {
        let Some(ref path) = self.persist_path else {
            return Ok(0);
        };
        if !path.exists() {
            return Ok(0);
        }

        let mut loaded = Vec::new();
        let mut entries = fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_path = entry.path();
            if file_path.extension().map_or(false, |e| e == "json") {
                let content = fs::read_to_string(&file_path).await?;
                match serde_json::from_str::<StoredWorkflow>(&content) {
                    Ok(workflow) => {
                        log::info!("Loaded workflow '{}' from {:?}", workflow.id, file_path);
                        loaded.push(workflow);
                    }
                    Err(e) => {
                        log::warn!("Failed to parse workflow from {:?}: {}", file_path, e);
                    }
                }
            }
        }

        let count = loaded.len();
        let mut workflows = self.workflows.write();
        for workflow in loaded {
            workflows.insert(workflow.id.clone(), workflow);
        }
        Ok(count)
    }

    async fn save_to_disk(&self, workflow: &StoredWorkflow) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };

        fs::create_dir_all(path).await?;
        let file_path = path.join(format!("{}.json", workflow.id));
        let content = serde_json::to_string_pretty(workflow)?;
        fs::write(&file_path, content).await?;
        log::debug!("Saved workflow '{}' to {:?}", workflow.id, file_path);
        Ok(())
    }

    /// Insert or replace a workflow as-is (persisted if enabled)
    pub async fn insert(&self, workflow: StoredWorkflow) -> Result<()> {
        self.save_to_disk(&workflow).await?;
        self.workflows.write().insert(workflow.id.clone(), workflow);
        Ok(())
    }

    /// Current server copy, if any
    pub fn get(&self, workflow_id: &str) -> Option<StoredWorkflow> {
        self.workflows.read().get(workflow_id).cloned()
    }

    /// List stored workflows ordered by ID
    pub fn list(&self) -> Vec<WorkflowSummary> {
        let mut summaries: Vec<WorkflowSummary> = self
            .workflows
            .read()
            .values()
            .map(|w| WorkflowSummary {
                id: w.id.clone(),
                name: w
                    .definition
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("name"))
                    .and_then(|n| n.as_str())
                    .map(str::to_string),
                version: w.version,
                node_count: w.definition.nodes.len(),
                updated_at: w.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Simulate a write from another client. Returns the new version.
    pub fn bump_version(&self, workflow_id: &str) -> Option<u64> {
        let mut workflows = self.workflows.write();
        let workflow = workflows.get_mut(workflow_id)?;
        workflow.version += 1;
        workflow.updated_at = Utc::now();
        Some(workflow.version)
    }

    /// Make every subsequent save fail with `StoreUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `save` calls received (including rejected ones)
    pub fn save_count(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn load(&self, workflow_id: &str) -> Result<StoredWorkflow> {
        self.get(workflow_id)
            .ok_or_else(|| WorkflowSyncError::WorkflowNotFound(workflow_id.to_string()))
    }

    async fn save(&self, workflow_id: &str, request: SaveRequest) -> Result<SaveResponse> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WorkflowSyncError::store("store is offline"));
        }

        // Version check, disk write and commit happen under one lock; the
        // in-memory copy only changes once the write succeeded.
        let _serial = self.save_lock.lock().await;
        let updated = {
            let workflows = self.workflows.read();
            let workflow = workflows
                .get(workflow_id)
                .ok_or_else(|| WorkflowSyncError::WorkflowNotFound(workflow_id.to_string()))?;

            if workflow.version != request.base_version {
                log::info!(
                    "Rejecting {:?} save of '{}': base version {} but server has {}",
                    request.source,
                    workflow_id,
                    request.base_version,
                    workflow.version
                );
                return Ok(SaveResponse::Conflict {
                    server_version: workflow.version,
                });
            }

            let mut updated = workflow.clone();
            updated.version += 1;
            updated.definition.nodes = request.nodes;
            updated.definition.edges = request.edges;
            updated.definition.settings = request.settings;
            updated.updated_at = Utc::now();
            updated
        };

        self.save_to_disk(&updated).await?;
        self.workflows
            .write()
            .insert(updated.id.clone(), updated.clone());
        log::debug!(
            "Saved workflow '{}' at version {} ({})",
            workflow_id,
            updated.version,
            request.change_description
        );
        Ok(SaveResponse::Saved {
            version: updated.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use tempfile::TempDir;

    fn request(base_version: u64) -> SaveRequest {
        let definition = WorkflowBuilder::new()
            .add_node("a", "navigate", (0.0, 0.0))
            .add_node("b", "click", (280.0, 0.0))
            .connect("a", "b")
            .build();
        SaveRequest {
            nodes: definition.nodes,
            edges: definition.edges,
            settings: None,
            source: SaveSource::Manual,
            change_description: "test".to_string(),
            base_version,
        }
    }

    async fn seeded() -> MemoryWorkflowStore {
        let store = MemoryWorkflowStore::new();
        let definition = WorkflowBuilder::new()
            .with_metadata(serde_json::json!({"name": "Demo"}))
            .build();
        store.insert(StoredWorkflow::new("wf-1", definition)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_save_bumps_version() {
        let store = seeded().await;
        let response = store.save("wf-1", request(1)).await.unwrap();
        assert_eq!(response, SaveResponse::Saved { version: 2 });

        let loaded = store.load("wf-1").await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.definition.nodes.len(), 2);
        // metadata is not part of the save payload
        assert_eq!(loaded.definition.metadata.unwrap()["name"], "Demo");
    }

    #[tokio::test]
    async fn test_stale_base_version_conflicts() {
        let store = seeded().await;
        assert_eq!(store.bump_version("wf-1"), Some(2));

        let response = store.save("wf-1", request(1)).await.unwrap();
        assert_eq!(response, SaveResponse::Conflict { server_version: 2 });
        assert!(store.get("wf-1").unwrap().definition.nodes.is_empty());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_and_unavailable() {
        let store = seeded().await;
        assert!(matches!(
            store.load("nope").await,
            Err(WorkflowSyncError::WorkflowNotFound(id)) if id == "nope"
        ));

        store.set_unavailable(true);
        assert!(matches!(
            store.save("wf-1", request(1)).await,
            Err(WorkflowSyncError::StoreUnavailable(_))
        ));
        assert_eq!(store.get("wf-1").unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_server_version() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("workflows");
        let store = MemoryWorkflowStore::with_persistence(&blocker);
        store
            .insert(StoredWorkflow::new("wf-1", WorkflowDefinition::default()))
            .await
            .unwrap();

        // a regular file where the directory should be
        std::fs::remove_dir_all(&blocker).unwrap();
        std::fs::write(&blocker, "").unwrap();
        assert!(store.save("wf-1", request(1)).await.is_err());
        let current = store.get("wf-1").unwrap();
        assert_eq!(current.version, 1);
        assert!(current.definition.nodes.is_empty());

        // the retry with the same base version goes through
        std::fs::remove_file(&blocker).unwrap();
        let response = store.save("wf-1", request(1)).await.unwrap();
        assert_eq!(response, SaveResponse::Saved { version: 2 });
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MemoryWorkflowStore::with_persistence(dir.path());
        store
            .insert(StoredWorkflow::new("wf-1", WorkflowDefinition::default()))
            .await
            .unwrap();
        store.save("wf-1", request(1)).await.unwrap();
        std::fs::write(dir.path().join("junk.json"), "{ nope").unwrap();

        let reopened = MemoryWorkflowStore::with_persistence(dir.path());
        assert_eq!(reopened.load_from_disk().await.unwrap(), 1);
        let loaded = reopened.load("wf-1").await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.definition.edges[0].id, "edge-a-out-b-in");
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let store = seeded().await;
        store
            .insert(StoredWorkflow::new("wf-0", WorkflowDefinition::default()))
            .await
            .unwrap();

        let list = store.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "wf-0");
        assert_eq!(list[0].name, None);
        assert_eq!(list[1].name.as_deref(), Some("Demo"));
    }

    #[test]
    fn test_load_from_disk_without_directory() {
        let dir = TempDir::new().unwrap();
        let store = MemoryWorkflowStore::with_persistence(dir.path().join("missing"));
        let count = tokio_test::block_on(store.load_from_disk());
        assert_eq!(tokio_test::assert_ok!(count), 0);
        assert_eq!(tokio_test::block_on(MemoryWorkflowStore::new().load_from_disk()).unwrap(), 0);
    }

    #[test]
    fn test_save_request_wire_format() {
        let value = serde_json::to_value(request(3)).unwrap();
        assert_eq!(value["source"], "manual");
        assert_eq!(value["changeDescription"], "test");
        assert_eq!(value["baseVersion"], 3);

        let conflict = serde_json::to_value(SaveResponse::Conflict { server_version: 4 }).unwrap();
        assert_eq!(conflict["status"], "conflict");
        assert_eq!(conflict["serverVersion"], 4);
    }
}
