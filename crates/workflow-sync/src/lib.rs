//! Workflow Sync - definition sync, validation and versioning for the node-graph editor
//!
//! This crate keeps two views of a browser-automation workflow consistent:
//! the interactive node/edge graph and its canonical JSON definition. It
//! provides:
//!
//! - Normalization and deterministic auto-layout of raw node/edge lists
//! - Condition metadata derived from well-known edge handles
//! - Structural validation with an optional external schema service
//! - Bounded, compressed undo/redo history
//! - Visual/Code mode switching with validated re-ingestion of JSON text
//! - Debounced autosave against a versioned store, suspended on conflict
//!
//! # Architecture
//!
//! - `WorkflowEditor`: one editing session with `init` / `teardown`
//! - `EditorState`: the working copy, mutated only through `EditorEvent`s
//! - `AutosaveScheduler`: debounced, serialized saves to a `WorkflowStore`
//! - `EventSink`: generic event reporting (not tied to any UI)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use workflow_sync::{MemoryWorkflowStore, NodeTypeRegistry, WorkflowEditor};
//!
//! let store = Arc::new(MemoryWorkflowStore::with_persistence(".workflows"));
//! store.load_from_disk().await?;
//!
//! let mut editor = WorkflowEditor::builder(store)
//!     .registry(Arc::new(NodeTypeRegistry::with_builtin_types()))
//!     .build();
//! editor.init("checkout-flow").await?;
//! editor.drop_node("click", None)?;
//! editor.save_now("Added click step").await?;
//! ```

pub mod autosave;
pub mod builder;
pub mod code_sync;
pub mod config;
pub mod constants;
pub mod edge_semantics;
pub mod error;
pub mod events;
pub mod history;
pub mod normalize;
pub mod registry;
pub mod request;
pub mod session;
pub mod store;
pub mod types;
pub mod validation;
pub mod viewport;

// Re-export key types
pub use autosave::{AutosaveScheduler, SaveOutcome};
pub use builder::WorkflowBuilder;
pub use code_sync::{to_text, CodeSync, FromTextOutcome, ModeController, ModeTransition};
pub use config::{AutosaveConfig, EditorConfig, LayoutConfig};
pub use edge_semantics::{
    derive_source_condition, derive_target_condition, enhance_connection, ConditionMeta,
};
pub use error::{Result, WorkflowSyncError};
pub use events::{EditorMode, EventSink, NullEventSink, SyncEvent, VecEventSink};
pub use history::{HistoryEntry, HistoryManager};
pub use normalize::{
    auto_layout_nodes, normalize_definition, normalize_edges, normalize_nodes, NormalizationReport,
};
pub use registry::{NodeTypeLookup, NodeTypeRegistry};
pub use session::{
    ConflictResolution, EditorEvent, EditorState, GraphChange, SharedEditorState, WorkflowEditor,
};
pub use store::{
    MemoryWorkflowStore, SaveRequest, SaveResponse, SaveSource, StoredWorkflow, WorkflowStore,
};
pub use types::{
    Connection, Edge, Issue, Node, Position, WorkflowDefinition, WorkflowSettings,
    WorkflowValidationResult,
};
pub use validation::{SchemaService, ValidationOutcome, Validator};
pub use viewport::{ViewportPreset, ViewportSettings};
