//! Fluent builder for workflow definitions
//!
//! Provides a compact API for constructing definitions programmatically.
//! Connections run through edge semantics, so condition metadata is always
//! consistent with the handles.

use serde_json::Value;

use crate::edge_semantics::enhance_connection;
use crate::types::{Connection, Edge, Node, Position, WorkflowDefinition, WorkflowSettings};
use crate::viewport::ViewportSettings;

/// Fluent builder for constructing workflow definitions
///
/// # Example
///
/// ```ignore
/// let definition = WorkflowBuilder::new()
///     .add_node("start", "start", (0.0, 0.0))
///     .add_node("check", "condition", (200.0, 0.0))
///     .with_data(serde_json::json!({"expression": "page.title != ''"}))
///     .add_node("click", "click", (400.0, 0.0))
///     .connect("start", "check")
///     .connect_handles("check", Some("branch-true"), "click", None)
///     .build();
/// ```
#[derive(Default)]
pub struct WorkflowBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    metadata: Option<serde_json::Map<String, Value>>,
    settings: Option<WorkflowSettings>,
}

impl WorkflowBuilder {
    /// Create a new workflow builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a placed node
    pub fn add_node(mut self, id: impl Into<String>, node_type: impl Into<String>, position: (f64, f64)) -> Self {
        self.nodes
            .push(Node::new(id, node_type, Position::new(position.0, position.1)));
        self
    }

    /// Add a node without a position (to be auto-laid-out)
    pub fn add_unplaced_node(mut self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let mut node = Node::new(id, node_type, Position::default());
        node.position = None;
        self.nodes.push(node);
        self
    }

    /// Set data on the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.data = data;
        }
        self
    }

    /// Connect two nodes through their default handles
    pub fn connect(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.connect_handles(source, None, target, None)
    }

    /// Connect two nodes through explicit handles
    pub fn connect_handles(
        mut self,
        source: impl Into<String>,
        source_handle: Option<&str>,
        target: impl Into<String>,
        target_handle: Option<&str>,
    ) -> Self {
        let connection = Connection::new(source, target).with_handles(source_handle, target_handle);
        self.edges.push(enhance_connection(&connection));
        self
    }

    /// Add a prebuilt edge verbatim
    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Set the metadata object (non-object values are ignored)
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        if let Value::Object(map) = metadata {
            self.metadata = Some(map);
        }
        self
    }

    /// Set the execution viewport
    pub fn with_viewport(mut self, viewport: ViewportSettings) -> Self {
        self.settings
            .get_or_insert_with(WorkflowSettings::default)
            .execution_viewport = Some(viewport);
        self
    }

    /// Build the definition without validation
    pub fn build(self) -> WorkflowDefinition {
        WorkflowDefinition {
            nodes: self.nodes,
            edges: self.edges,
            metadata: self.metadata,
            settings: self.settings,
        }
    }
}
