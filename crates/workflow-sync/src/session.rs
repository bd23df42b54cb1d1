//! Editor session: shared state, graph edits and lifecycle
//!
//! All mutations go through [`EditorState::apply`], driven by tagged
//! [`EditorEvent`]s. Loading from the store never marks the state dirty;
//! user edits do, and schedule an autosave. Readers (validation, code sync,
//! history) always work on a snapshot taken by value.
//!
//! [`WorkflowEditor`] owns one session with lifecycle `init(workflow_id)` /
//! `teardown()`.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::autosave::{AutosaveScheduler, SaveOutcome};
use crate::code_sync::{CodeSync, ModeController, ModeTransition};
use crate::config::EditorConfig;
use crate::edge_semantics::enhance_connection;
use crate::error::{Result, WorkflowSyncError};
use crate::events::{emit, EditorMode, EventSink, NullEventSink, SyncEvent};
use crate::history::{HistoryEntry, HistoryManager};
use crate::normalize::{auto_layout_nodes_with, normalize_definition};
use crate::registry::NodeTypeLookup;
use crate::store::{StoredWorkflow, WorkflowStore};
use crate::types::{
    chain_ends, Connection, Edge, EdgeId, Issue, Node, NodeId, Position, WorkflowDefinition,
    WorkflowSettings,
};
use crate::validation::{SchemaService, ValidationOutcome, Validator};
use crate::viewport::{ViewportPreset, ViewportSettings};

/// Editor state shared with the autosave task
pub type SharedEditorState = Arc<RwLock<EditorState>>;

/// The editor's working copy of one workflow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorState {
    /// `None` before `init` and after `teardown`
    pub workflow_id: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub settings: Option<WorkflowSettings>,
    pub metadata: Option<Map<String, Value>>,
    /// Server version the working copy is based on
    pub version: u64,
    /// Server version reported by the last conflict
    pub server_version: Option<u64>,
    /// Unsaved edits exist
    pub dirty: bool,
    pub has_version_conflict: bool,
    /// Bumped on every edit that dirties the state
    pub revision: u64,
    pub mode: EditorMode,
}

/// Input to the state's single mutation function
#[derive(Debug, Clone)]
pub enum EditorEvent {
    /// Replace the working copy with the server copy
    LoadedFromStore(StoredWorkflow),
    /// A graph edit made by the user
    UserEdited(GraphChange),
    /// An undo/redo snapshot was restored
    Restored(HistoryEntry),
    /// Code-mode text was adopted
    AdoptedFromText(WorkflowDefinition),
}

/// A single edit to the graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    /// Add a node; unplaced nodes are laid out automatically
    AddNode(Node),
    /// Remove a node and every edge touching it
    RemoveNode(NodeId),
    /// Connect two nodes through handles
    Connect(Connection),
    RemoveEdge(EdgeId),
    /// Move a node; `dragging` is true for intermediate pointer frames
    MoveNode {
        id: NodeId,
        position: Position,
        dragging: bool,
    },
    /// Replace a node's configuration object
    UpdateNodeData { id: NodeId, data: Value },
    /// Editor selection; does not dirty the document
    Select { id: NodeId, selected: bool },
    SetViewport(ViewportSettings),
}

impl GraphChange {
    /// Whether this change gets its own undo snapshot
    pub fn is_significant(&self) -> bool {
        match self {
            Self::AddNode(_) | Self::RemoveNode(_) | Self::Connect(_) | Self::RemoveEdge(_) => true,
            Self::MoveNode { dragging, .. } => !dragging,
            Self::UpdateNodeData { .. } | Self::Select { .. } | Self::SetViewport(_) => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::AddNode(node) => format!("Added node '{}'", node.id),
            Self::RemoveNode(id) => format!("Removed node '{}'", id),
            Self::Connect(c) => format!("Connected '{}' to '{}'", c.source, c.target),
            Self::RemoveEdge(id) => format!("Removed edge '{}'", id),
            Self::MoveNode { id, .. } => format!("Moved node '{}'", id),
            Self::UpdateNodeData { id, .. } => format!("Updated node '{}'", id),
            Self::Select { id, .. } => format!("Selected node '{}'", id),
            Self::SetViewport(v) => format!("Set viewport to {}x{}", v.width(), v.height()),
        }
    }
}

impl EditorState {
    /// Snapshot the working copy as a definition
    pub fn definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            metadata: self.metadata.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Apply an event. Returns whether the state changed.
    pub fn apply(&mut self, event: EditorEvent) -> bool {
        match event {
            EditorEvent::LoadedFromStore(stored) => {
                self.workflow_id = Some(stored.id);
                self.nodes = stored.definition.nodes;
                self.edges = stored.definition.edges;
                self.metadata = stored.definition.metadata;
                self.settings = stored.definition.settings;
                self.version = stored.version;
                self.server_version = None;
                self.dirty = false;
                self.has_version_conflict = false;
                self.mode = EditorMode::Visual;
                true
            }
            EditorEvent::UserEdited(change) => {
                let dirties = !matches!(change, GraphChange::Select { .. });
                let changed = self.apply_change(change);
                if changed && dirties {
                    self.mark_dirty();
                }
                changed
            }
            EditorEvent::Restored(entry) => {
                self.nodes = entry.nodes;
                self.edges = entry.edges;
                self.mark_dirty();
                true
            }
            EditorEvent::AdoptedFromText(definition) => {
                self.nodes = definition.nodes;
                self.edges = definition.edges;
                self.metadata = definition.metadata;
                self.settings = definition.settings;
                self.mark_dirty();
                true
            }
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    fn has_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    fn apply_change(&mut self, change: GraphChange) -> bool {
        match change {
            GraphChange::AddNode(node) => {
                if self.has_node(&node.id) {
                    log::warn!("Ignoring duplicate node '{}'", node.id);
                    return false;
                }
                let placed = node.is_placed();
                self.nodes.push(node);
                if !placed {
                    self.nodes = auto_layout_nodes_with(&self.nodes, &self.edges, &Default::default());
                }
                true
            }
            GraphChange::RemoveNode(id) => {
                let before = self.nodes.len();
                self.nodes.retain(|n| n.id != id);
                if self.nodes.len() == before {
                    return false;
                }
                self.edges.retain(|e| e.source != id && e.target != id);
                true
            }
            GraphChange::Connect(connection) => {
                if !self.has_node(&connection.source) || !self.has_node(&connection.target) {
                    log::warn!(
                        "Ignoring connection {} -> {}: endpoint missing",
                        connection.source,
                        connection.target
                    );
                    return false;
                }
                let edge = enhance_connection(&connection);
                if self.edges.iter().any(|e| e.id == edge.id) {
                    return false;
                }
                self.edges.push(edge);
                true
            }
            GraphChange::RemoveEdge(id) => {
                let before = self.edges.len();
                self.edges.retain(|e| e.id != id);
                self.edges.len() != before
            }
            GraphChange::MoveNode { id, position, .. } => match self.node_mut(&id) {
                Some(node) if node.position != Some(position) => {
                    node.position = Some(position);
                    true
                }
                _ => false,
            },
            GraphChange::UpdateNodeData { id, data } => {
                if !data.is_object() {
                    log::warn!("Ignoring non-object data for node '{}'", id);
                    return false;
                }
                match self.node_mut(&id) {
                    Some(node) if node.data != data => {
                        node.data = data;
                        true
                    }
                    _ => false,
                }
            }
            GraphChange::Select { id, selected } => match self.node_mut(&id) {
                Some(node) if node.selected != Some(selected) => {
                    node.selected = Some(selected);
                    true
                }
                _ => false,
            },
            GraphChange::SetViewport(viewport) => {
                let settings = self.settings.get_or_insert_with(WorkflowSettings::default);
                if settings.execution_viewport.as_ref() == Some(&viewport) {
                    return false;
                }
                settings.execution_viewport = Some(viewport);
                true
            }
        }
    }
}

/// How to leave a version conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Discard local edits and load the server copy
    Reload,
    /// Rebase local edits onto the server version and save them
    KeepLocal,
}

/// Generate a fresh node ID for a node type
pub fn new_node_id(node_type: &str) -> NodeId {
    format!("{}-{}", node_type, Uuid::new_v4().simple())
}

/// Builder for [`WorkflowEditor`]
pub struct WorkflowEditorBuilder {
    store: Arc<dyn WorkflowStore>,
    config: EditorConfig,
    registry: Option<Arc<dyn NodeTypeLookup>>,
    schema: Option<Arc<dyn SchemaService>>,
    sink: Arc<dyn EventSink>,
}

impl WorkflowEditorBuilder {
    pub fn config(mut self, config: EditorConfig) -> Self {
        self.config = config;
        self
    }

    /// Check node types against a registry
    pub fn registry(mut self, registry: Arc<dyn NodeTypeLookup>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn schema_service(mut self, schema: Arc<dyn SchemaService>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> WorkflowEditor {
        let make_validator = || {
            let mut validator = Validator::new();
            if let Some(registry) = &self.registry {
                validator = validator.with_registry(registry.clone());
            }
            if let Some(schema) = &self.schema {
                validator = validator.with_schema_service(schema.clone());
            }
            Arc::new(validator)
        };

        // Code sync gets its own validator so a background validation never
        // supersedes a mode transition.
        let validator = make_validator();
        let code_sync = CodeSync::new(make_validator()).with_layout(self.config.layout.clone());

        let state: SharedEditorState = Arc::new(RwLock::new(EditorState::default()));
        let autosave = AutosaveScheduler::new(
            self.store.clone(),
            state.clone(),
            self.config.autosave.clone(),
            self.sink.clone(),
        );

        WorkflowEditor {
            store: self.store,
            state,
            history: HistoryManager::new(self.config.history_limit),
            validator,
            code_sync,
            modes: ModeController::new(),
            autosave,
            sink: self.sink,
            config: self.config,
        }
    }
}

/// One editing session over a workflow held by a [`WorkflowStore`]
pub struct WorkflowEditor {
    store: Arc<dyn WorkflowStore>,
    state: SharedEditorState,
    history: HistoryManager,
    validator: Arc<Validator>,
    code_sync: CodeSync,
    modes: ModeController,
    autosave: AutosaveScheduler,
    sink: Arc<dyn EventSink>,
    config: EditorConfig,
}

impl WorkflowEditor {
    pub fn builder(store: Arc<dyn WorkflowStore>) -> WorkflowEditorBuilder {
        WorkflowEditorBuilder {
            store,
            config: EditorConfig::default(),
            registry: None,
            schema: None,
            sink: Arc::new(NullEventSink),
        }
    }

    /// Handle to the shared state
    pub fn state(&self) -> SharedEditorState {
        self.state.clone()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> EditorState {
        self.state.read().clone()
    }

    /// Current definition, by value
    pub fn definition(&self) -> WorkflowDefinition {
        self.state.read().definition()
    }

    pub fn mode(&self) -> EditorMode {
        self.modes.mode()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_autosave_pending(&self) -> bool {
        self.autosave.is_pending()
    }

    fn active_workflow(&self) -> Result<String> {
        self.state
            .read()
            .workflow_id
            .clone()
            .ok_or(WorkflowSyncError::NoActiveWorkflow)
    }

    /// Load a workflow, tearing down any previous session.
    ///
    /// On failure the current session is left as it was.
    pub async fn init(&mut self, workflow_id: &str) -> Result<()> {
        let stored = self.store.load(workflow_id).await?;
        let (stored, history) = self.prepare_loaded(stored)?;

        if self.state.read().workflow_id.is_some() {
            self.teardown();
        }
        self.commit_loaded(stored, history);
        log::info!("Editor initialized for workflow '{}'", workflow_id);
        Ok(())
    }

    fn prepare_loaded(&self, stored: StoredWorkflow) -> Result<(StoredWorkflow, HistoryManager)> {
        let (definition, report) = normalize_definition(stored.definition);
        if report.dropped_nodes > 0 || report.dropped_edges > 0 {
            log::warn!(
                "Workflow '{}' had {} invalid node(s) and {} orphaned edge(s); dropped",
                stored.id,
                report.dropped_nodes,
                report.dropped_edges
            );
        }
        let nodes = auto_layout_nodes_with(&definition.nodes, &definition.edges, &self.config.layout);
        let definition = WorkflowDefinition { nodes, ..definition };

        let mut history = HistoryManager::new(self.config.history_limit);
        history.reset(&definition.nodes, &definition.edges)?;
        Ok((
            StoredWorkflow {
                definition,
                ..stored
            },
            history,
        ))
    }

    fn commit_loaded(&mut self, stored: StoredWorkflow, history: HistoryManager) {
        let workflow_id = stored.id.clone();
        let version = stored.version;
        self.history = history;
        self.state.write().apply(EditorEvent::LoadedFromStore(stored));
        emit(self.sink.as_ref(), SyncEvent::Loaded { workflow_id, version });
    }

    /// Cancel timers and in-flight work and clear the session
    pub fn teardown(&mut self) {
        self.autosave.teardown();
        self.validator.cancel();
        self.history.clear();
        self.modes.discard_code();

        let mut state = self.state.write();
        if state.dirty {
            log::warn!(
                "Tearing down '{}' with unsaved edits",
                state.workflow_id.as_deref().unwrap_or_default()
            );
        }
        *state = EditorState::default();
    }

    /// Apply a user edit. Returns whether anything changed.
    pub fn apply(&mut self, change: GraphChange) -> Result<bool> {
        self.apply_changes(vec![change])
    }

    /// Apply several edits as one undo step
    fn apply_changes(&mut self, changes: Vec<GraphChange>) -> Result<bool> {
        self.active_workflow()?;
        let significant = changes.iter().any(GraphChange::is_significant);
        let reason = changes.first().map(GraphChange::describe).unwrap_or_default();

        let dirtied = {
            let mut state = self.state.write();
            let mut next = state.clone();
            let mut changed = false;
            for change in changes {
                changed |= next.apply(EditorEvent::UserEdited(change));
            }
            if !changed {
                return Ok(false);
            }
            if significant {
                self.history.snapshot(&next.nodes, &next.edges)?;
            }
            let dirtied = next.revision != state.revision;
            *state = next;
            dirtied
        };

        if dirtied {
            self.autosave.schedule_autosave(&reason);
        }
        Ok(true)
    }

    /// Drop a new node onto the canvas.
    ///
    /// When exactly one node lacks outgoing edges, the new node is wired
    /// after it and placed to its right. With several chain ends (or none)
    /// nothing is connected.
    pub fn drop_node(&mut self, node_type: &str, position: Option<Position>) -> Result<NodeId> {
        self.active_workflow()?;
        let id = new_node_id(node_type);

        let chain_end = {
            let state = self.state.read();
            match chain_ends(&state.nodes, &state.edges).as_slice() {
                [end] => Some((end.id.clone(), end.position)),
                _ => None,
            }
        };

        let position = position.or_else(|| {
            chain_end
                .as_ref()
                .and_then(|(_, p)| *p)
                .map(|p| Position::new(p.x + self.config.layout.horizontal_spacing, p.y))
        });
        let mut node = Node::new(id.clone(), node_type, Position::default());
        node.position = position;
        if node.position.is_none() {
            let state = self.state.read();
            let mut nodes = state.nodes.clone();
            nodes.push(node.clone());
            node.position = auto_layout_nodes_with(&nodes, &state.edges, &self.config.layout)
                .into_iter()
                .find(|n| n.id == id)
                .and_then(|n| n.position);
        }

        let mut changes = vec![GraphChange::AddNode(node)];
        if let Some((end_id, _)) = chain_end {
            log::debug!("Auto-connecting '{}' after chain end '{}'", id, end_id);
            changes.push(GraphChange::Connect(Connection::new(end_id, id.clone())));
        }
        self.apply_changes(changes)?;
        Ok(id)
    }

    /// Resize the execution viewport.
    ///
    /// Out-of-range dimensions are rejected with a range error and nothing
    /// changes.
    pub fn set_viewport_dimensions(&mut self, width: u32, height: u32) -> Result<bool> {
        let mut viewport = self.definition().viewport().cloned().unwrap_or_default();
        viewport.set_dimensions(width, height)?;
        self.apply(GraphChange::SetViewport(viewport))
    }

    /// Switch the viewport to a named preset (`Custom` is a no-op)
    pub fn set_viewport_preset(&mut self, preset: ViewportPreset) -> Result<bool> {
        match ViewportSettings::from_preset(preset) {
            Some(viewport) => self.apply(GraphChange::SetViewport(viewport)),
            None => Ok(false),
        }
    }

    pub fn undo(&mut self) -> Result<bool> {
        self.active_workflow()?;
        match self.history.undo() {
            Some(entry) => self.restore(entry?, "Undo"),
            None => Ok(false),
        }
    }

    pub fn redo(&mut self) -> Result<bool> {
        self.active_workflow()?;
        match self.history.redo() {
            Some(entry) => self.restore(entry?, "Redo"),
            None => Ok(false),
        }
    }

    fn restore(&mut self, entry: HistoryEntry, reason: &str) -> Result<bool> {
        self.state.write().apply(EditorEvent::Restored(entry));
        self.autosave.schedule_autosave(reason);
        Ok(true)
    }

    /// Switch to code mode; returns the captured text
    pub fn enter_code_mode(&mut self) -> Result<String> {
        self.active_workflow()?;
        let definition = self.definition();
        match self.modes.enter_code(&definition)? {
            ModeTransition::EnteredCode { text } => {
                self.set_mode(EditorMode::Code);
                Ok(text)
            }
            _ => Ok(self.modes.text().unwrap_or_default().to_string()),
        }
    }

    /// Replace the code-mode text
    pub fn edit_code(&mut self, text: impl Into<String>) {
        self.modes.edit_text(text);
    }

    /// Current code-mode text
    pub fn code_text(&self) -> Option<&str> {
        self.modes.text()
    }

    /// Try to return to visual mode, adopting edited text first.
    ///
    /// A blocked transition leaves both the mode and the graph unchanged.
    pub async fn leave_code_mode(&mut self) -> Result<ModeTransition> {
        let transition = self.modes.leave_code(&self.code_sync).await;
        match &transition {
            ModeTransition::LeftCode { adopted, warnings } => {
                if let Some(definition) = adopted {
                    self.adopt(definition.clone(), warnings.clone())?;
                }
                self.set_mode(EditorMode::Visual);
            }
            ModeTransition::Blocked { errors } => {
                emit(
                    self.sink.as_ref(),
                    SyncEvent::TransitionBlocked {
                        errors: errors.clone(),
                    },
                );
            }
            ModeTransition::Unchanged | ModeTransition::EnteredCode { .. } => {}
        }
        Ok(transition)
    }

    /// Abandon code edits and return to visual mode
    pub fn discard_code_edits(&mut self) {
        if self.modes.mode() == EditorMode::Code {
            self.modes.discard_code();
            self.set_mode(EditorMode::Visual);
        }
    }

    fn adopt(&mut self, definition: WorkflowDefinition, warnings: Vec<Issue>) -> Result<()> {
        {
            let mut state = self.state.write();
            let mut next = state.clone();
            next.apply(EditorEvent::AdoptedFromText(definition));
            self.history.snapshot(&next.nodes, &next.edges)?;
            *state = next;
        }
        self.autosave.schedule_autosave("Edited as code");
        emit(self.sink.as_ref(), SyncEvent::AdoptedFromText { warnings });
        Ok(())
    }

    fn set_mode(&mut self, mode: EditorMode) {
        self.state.write().mode = mode;
        emit(self.sink.as_ref(), SyncEvent::ModeChanged { mode });
    }

    /// Validate the current definition.
    ///
    /// A later call supersedes this one; superseded results are not emitted.
    pub async fn validate(&self) -> Result<ValidationOutcome> {
        let definition = self.definition();
        let outcome = self.validator.validate(definition).await?;
        if let ValidationOutcome::Completed(result) = &outcome {
            emit(
                self.sink.as_ref(),
                SyncEvent::ValidationCompleted {
                    result: result.clone(),
                },
            );
        }
        Ok(outcome)
    }

    /// Save immediately (no-op when clean)
    pub async fn save_now(&self, description: &str) -> Result<SaveOutcome> {
        self.active_workflow()?;
        self.autosave.save_now(description).await
    }

    /// Leave a version conflict. No-op when none is flagged.
    pub async fn resolve_conflict(&mut self, resolution: ConflictResolution) -> Result<()> {
        let workflow_id = self.active_workflow()?;
        if !self.state.read().has_version_conflict {
            return Ok(());
        }

        match resolution {
            ConflictResolution::Reload => {
                let stored = self.store.load(&workflow_id).await?;
                let (stored, history) = self.prepare_loaded(stored)?;
                self.autosave.cancel_autosave();
                self.discard_code_edits();
                self.commit_loaded(stored, history);
                log::info!("Reloaded '{}' from the store after a conflict", workflow_id);
            }
            ConflictResolution::KeepLocal => {
                {
                    let mut state = self.state.write();
                    if let Some(server_version) = state.server_version {
                        state.version = server_version;
                    }
                }
                log::info!("Keeping local edits of '{}' over the server copy", workflow_id);
                self.autosave.set_version_conflict(false);
            }
        }
        Ok(())
    }
}

impl Drop for WorkflowEditor {
    fn drop(&mut self) {
        self.autosave.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::config::LayoutConfig;
    use crate::events::VecEventSink;
    use crate::registry::NodeTypeRegistry;
    use crate::store::MemoryWorkflowStore;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn editor_with(definition: WorkflowDefinition) -> (WorkflowEditor, Arc<MemoryWorkflowStore>, Arc<VecEventSink>) {
        let store = Arc::new(MemoryWorkflowStore::new());
        store.insert(StoredWorkflow::new("wf-1", definition)).await.unwrap();
        let sink = Arc::new(VecEventSink::new());
        let mut editor = WorkflowEditor::builder(store.clone())
            .registry(Arc::new(NodeTypeRegistry::with_builtin_types()))
            .event_sink(sink.clone())
            .build();
        editor.init("wf-1").await.unwrap();
        (editor, store, sink)
    }

    fn chain() -> WorkflowDefinition {
        WorkflowBuilder::new()
            .add_node("a", "navigate", (100.0, 100.0))
            .add_node("b", "click", (380.0, 100.0))
            .add_edge(Edge::new("e1", "a", "b"))
            .with_metadata(json!({"name": "Chain"}))
            .build()
    }

    #[tokio::test]
    async fn test_load_is_clean() {
        let (editor, store, sink) = editor_with(chain()).await;
        let state = editor.snapshot();
        assert_eq!(state.workflow_id.as_deref(), Some("wf-1"));
        assert_eq!(state.version, 1);
        assert!(!state.dirty);
        assert!(!editor.is_autosave_pending());
        assert!(!editor.can_undo());
        assert_eq!(store.save_count(), 0);
        assert!(matches!(sink.events()[0], SyncEvent::Loaded { version: 1, .. }));
    }

    #[tokio::test]
    async fn test_drop_node_connects_sole_chain_end() {
        let (mut editor, _, _) = editor_with(chain()).await;

        let id = editor.drop_node("screenshot", None).unwrap();
        let definition = editor.definition();
        assert_eq!(definition.nodes.len(), 3);
        assert_eq!(definition.edges.len(), 2);
        let edge = &definition.edges[1];
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("b", id.as_str()));
        assert_eq!(
            definition.find_node(&id).unwrap().position,
            Some(Position::new(660.0, 100.0))
        );

        // one undo step removes both the node and its edge
        assert!(editor.undo().unwrap());
        assert_eq!(editor.definition().nodes.len(), 2);
        assert_eq!(editor.definition().edges.len(), 1);
    }

    #[tokio::test]
    async fn test_drop_node_with_two_chain_ends_does_not_connect() {
        let definition = WorkflowBuilder::new()
            .add_node("a", "navigate", (100.0, 100.0))
            .add_node("b", "click", (380.0, 100.0))
            .build();
        let (mut editor, _, _) = editor_with(definition).await;

        let id = editor.drop_node("wait", None).unwrap();
        let definition = editor.definition();
        assert!(definition.edges.is_empty());
        assert!(definition.find_node(&id).unwrap().is_placed());
    }

    #[tokio::test]
    async fn test_drop_node_uses_configured_layout() {
        let store = Arc::new(MemoryWorkflowStore::new());
        store
            .insert(StoredWorkflow::new("wf-1", WorkflowDefinition::default()))
            .await
            .unwrap();
        let config = EditorConfig {
            layout: LayoutConfig {
                origin_x: 40.0,
                origin_y: 60.0,
                ..LayoutConfig::default()
            },
            ..EditorConfig::default()
        };
        let mut editor = WorkflowEditor::builder(store).config(config).build();
        editor.init("wf-1").await.unwrap();

        let id = editor.drop_node("navigate", None).unwrap();
        assert_eq!(
            editor.definition().find_node(&id).unwrap().position,
            Some(Position::new(40.0, 60.0))
        );
    }

    #[tokio::test]
    async fn test_edits_dirty_and_snapshot() {
        let (mut editor, _, _) = editor_with(chain()).await;

        assert!(editor
            .apply(GraphChange::Select {
                id: "a".to_string(),
                selected: true
            })
            .unwrap());
        assert!(!editor.snapshot().dirty);
        assert!(!editor.is_autosave_pending());

        for x in [110.0, 120.0, 130.0] {
            editor
                .apply(GraphChange::MoveNode {
                    id: "a".to_string(),
                    position: Position::new(x, 100.0),
                    dragging: true,
                })
                .unwrap();
        }
        assert!(!editor.can_undo());
        editor
            .apply(GraphChange::MoveNode {
                id: "a".to_string(),
                position: Position::new(140.0, 100.0),
                dragging: false,
            })
            .unwrap();
        assert!(editor.can_undo());

        let state = editor.snapshot();
        assert!(state.dirty);
        assert_eq!(state.revision, 4);
        assert!(editor.is_autosave_pending());

        assert!(editor.undo().unwrap());
        assert_eq!(editor.definition().nodes[0].position, Some(Position::new(100.0, 100.0)));
        assert!(!editor.undo().unwrap());
        assert!(editor.redo().unwrap());
        assert_eq!(editor.definition().nodes[0].position, Some(Position::new(140.0, 100.0)));
    }

    #[tokio::test]
    async fn test_remove_node_drops_incident_edges() {
        let (mut editor, _, _) = editor_with(chain()).await;
        assert!(editor.apply(GraphChange::RemoveNode("b".to_string())).unwrap());
        assert!(editor.definition().edges.is_empty());
        assert!(!editor.apply(GraphChange::RemoveNode("b".to_string())).unwrap());
    }

    #[tokio::test]
    async fn test_connect_derives_metadata() {
        let definition = WorkflowBuilder::new()
            .add_node("check", "condition", (100.0, 100.0))
            .add_node("yes", "click", (380.0, 100.0))
            .build();
        let (mut editor, _, _) = editor_with(definition).await;

        let connection = Connection::new("check", "yes").with_handles(Some("branch-true"), None);
        assert!(editor.apply(GraphChange::Connect(connection.clone())).unwrap());
        assert!(!editor.apply(GraphChange::Connect(connection)).unwrap());
        assert!(!editor
            .apply(GraphChange::Connect(Connection::new("check", "ghost")))
            .unwrap());

        let definition = editor.definition();
        assert_eq!(definition.edges.len(), 1);
        assert_eq!(definition.edges[0].condition(), Some("true"));
    }

    #[tokio::test]
    async fn test_viewport_range_error_leaves_state() {
        let (mut editor, _, _) = editor_with(chain()).await;

        let err = editor.set_viewport_dimensions(100, 800).unwrap_err();
        assert!(matches!(err, WorkflowSyncError::Range { .. }));
        assert!(editor.definition().viewport().is_none());
        assert!(!editor.snapshot().dirty);

        assert!(editor.set_viewport_dimensions(390, 844).unwrap());
        assert_eq!(editor.definition().viewport().unwrap().preset(), ViewportPreset::Mobile);
        assert!(editor.set_viewport_preset(ViewportPreset::Desktop).unwrap());
        assert!(!editor.set_viewport_preset(ViewportPreset::Custom).unwrap());
        assert_eq!(editor.definition().viewport().unwrap().width(), 1920);
    }

    #[tokio::test]
    async fn test_code_mode_adoption() {
        let (mut editor, _, sink) = editor_with(chain()).await;

        let text = editor.enter_code_mode().unwrap();
        assert_eq!(editor.mode(), EditorMode::Code);
        assert_eq!(editor.snapshot().mode, EditorMode::Code);

        editor.edit_code(text.replace("\"click\"", "\"hover\""));
        let transition = editor.leave_code_mode().await.unwrap();
        assert!(matches!(transition, ModeTransition::LeftCode { adopted: Some(_), .. }));
        assert_eq!(editor.mode(), EditorMode::Visual);

        let state = editor.snapshot();
        assert!(state.dirty);
        assert_eq!(state.nodes[1].node_type, "hover");
        assert!(editor.can_undo());
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, SyncEvent::AdoptedFromText { .. })));
    }

    #[tokio::test]
    async fn test_invalid_code_blocks_transition() {
        let (mut editor, _, sink) = editor_with(chain()).await;
        let before = editor.definition();

        editor.enter_code_mode().unwrap();
        editor.edit_code("{\"nodes\": [{\"id\": \"a\", \"type\": \"warp\"}]}");
        let transition = editor.leave_code_mode().await.unwrap();

        assert!(matches!(transition, ModeTransition::Blocked { .. }));
        assert_eq!(editor.mode(), EditorMode::Code);
        assert_eq!(editor.definition(), before);
        assert!(!editor.snapshot().dirty);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, SyncEvent::TransitionBlocked { .. })));

        editor.discard_code_edits();
        assert_eq!(editor.mode(), EditorMode::Visual);
    }

    #[tokio::test]
    async fn test_init_failure_keeps_session() {
        let (mut editor, _, _) = editor_with(chain()).await;
        editor.drop_node("wait", None).unwrap();

        let err = editor.init("missing").await.unwrap_err();
        assert!(matches!(err, WorkflowSyncError::WorkflowNotFound(_)));
        let state = editor.snapshot();
        assert_eq!(state.workflow_id.as_deref(), Some("wf-1"));
        assert_eq!(state.nodes.len(), 3);
    }

    #[tokio::test]
    async fn test_edits_require_active_workflow() {
        let store = Arc::new(MemoryWorkflowStore::new());
        let mut editor = WorkflowEditor::builder(store).build();
        assert!(matches!(
            editor.apply(GraphChange::RemoveNode("a".to_string())),
            Err(WorkflowSyncError::NoActiveWorkflow)
        ));
        assert!(matches!(
            editor.save_now("manual").await,
            Err(WorkflowSyncError::NoActiveWorkflow)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_autosave() {
        let (mut editor, store, _) = editor_with(chain()).await;
        editor.drop_node("wait", None).unwrap();
        assert!(editor.is_autosave_pending());

        editor.teardown();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(store.save_count(), 0);
        assert_eq!(editor.snapshot(), EditorState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_workflows_cancels_timers() {
        let (mut editor, store, _) = editor_with(chain()).await;
        store
            .insert(StoredWorkflow::new("wf-2", WorkflowDefinition::default()))
            .await
            .unwrap();

        editor.drop_node("wait", None).unwrap();
        editor.init("wf-2").await.unwrap();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(store.save_count(), 0);
        assert_eq!(store.get("wf-1").unwrap().definition.nodes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_after_edit() {
        let (mut editor, store, _) = editor_with(chain()).await;
        editor.drop_node("wait", None).unwrap();
        sleep(Duration::from_secs(3)).await;

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.get("wf-1").unwrap().definition.nodes.len(), 3);
        let state = editor.snapshot();
        assert!(!state.dirty);
        assert_eq!(state.version, 2);
    }

    #[tokio::test]
    async fn test_conflict_reload() {
        let (mut editor, store, _) = editor_with(chain()).await;
        editor.drop_node("wait", None).unwrap();
        store.bump_version("wf-1");

        assert_eq!(
            editor.save_now("manual").await.unwrap(),
            SaveOutcome::Conflict { server_version: 2 }
        );
        editor.resolve_conflict(ConflictResolution::Reload).await.unwrap();

        let state = editor.snapshot();
        assert!(!state.has_version_conflict);
        assert!(!state.dirty);
        assert_eq!(state.version, 2);
        assert_eq!(state.nodes.len(), 2);
        assert!(!editor.can_undo());
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_keep_local() {
        let (mut editor, store, _) = editor_with(chain()).await;
        editor.drop_node("wait", None).unwrap();
        store.bump_version("wf-1");
        editor.save_now("manual").await.unwrap();

        editor.resolve_conflict(ConflictResolution::KeepLocal).await.unwrap();
        sleep(Duration::from_secs(3)).await;

        assert_eq!(store.save_count(), 2);
        let stored = store.get("wf-1").unwrap();
        assert_eq!(stored.version, 3);
        assert_eq!(stored.definition.nodes.len(), 3);
        assert!(!editor.snapshot().dirty);
    }

    #[tokio::test]
    async fn test_validate_emits_result() {
        let (editor, _, sink) = editor_with(chain()).await;
        let outcome = editor.validate().await.unwrap();
        let result = outcome.into_result().unwrap();
        assert!(result.valid);
        assert_eq!(result.stats.node_count, 2);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, SyncEvent::ValidationCompleted { .. })));
    }
}
