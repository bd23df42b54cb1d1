//! Core types for workflow definitions
//!
//! These types mirror the persisted/exported JSON document: nodes, edges,
//! metadata and settings, plus the validation result shape returned by the
//! validator and the schema service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::viewport::ViewportSettings;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Canvas coordinates of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A node instance in a workflow
///
/// `position` is `None` only between normalization and auto-layout; every
/// node held by the editor or written to the store is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Node type (looked up in the node-type registry)
    #[serde(rename = "type")]
    pub node_type: String,
    /// Position in the editor canvas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Node configuration
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Editor selection flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

impl Node {
    /// Create a placed node with empty data
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            position: Some(position),
            data: empty_object(),
            selected: None,
        }
    }

    /// Set the node data
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Whether the node has been assigned canvas coordinates
    pub fn is_placed(&self) -> bool {
        self.position.is_some()
    }
}

/// Derived edge payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Derived edge stroke styling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    pub stroke: String,
    pub stroke_width: f64,
}

/// An edge connecting two nodes
///
/// `data`, `label` and `style` are derived from the handle identifiers by
/// `edge_semantics` and are never user-entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    /// Source node ID
    pub source: NodeId,
    /// Target node ID
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EdgeData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<EdgeStyle>,
}

impl Edge {
    /// Create a plain edge without handles or derived metadata
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            data: None,
            label: None,
            style: None,
        }
    }

    /// The derived condition tag, if any
    pub fn condition(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.condition.as_deref())
    }
}

/// A connection request from the graph editor (before it becomes an edge)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_handles(mut self, source_handle: Option<&str>, target_handle: Option<&str>) -> Self {
        self.source_handle = source_handle.map(str::to_string);
        self.target_handle = target_handle.map(str::to_string);
        self
    }
}

/// Workflow-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_viewport: Option<ViewportSettings>,
    /// Settings this engine does not interpret, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The canonical workflow document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<WorkflowSettings>,
}

impl WorkflowDefinition {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            metadata: None,
            settings: None,
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Get edges going out of a node
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Get edges coming into a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// The configured execution viewport, if any
    pub fn viewport(&self) -> Option<&ViewportSettings> {
        self.settings.as_ref()?.execution_viewport.as_ref()
    }
}

/// Nodes with no outgoing edges, in node order
pub fn chain_ends<'a>(nodes: &'a [Node], edges: &[Edge]) -> Vec<&'a Node> {
    nodes
        .iter()
        .filter(|n| !edges.iter().any(|e| e.source == n.id))
        .collect()
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    /// Create an issue anchored at a JSON path (e.g. `nodes[2].type`)
    pub fn at(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

/// Summary counts reported alongside a validation result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub node_count: usize,
    #[serde(default)]
    pub edge_count: usize,
    #[serde(default)]
    pub root_count: usize,
    #[serde(default)]
    pub branch_count: usize,
    #[serde(default)]
    pub loop_count: usize,
    /// Counters reported by the schema service that this engine does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of validating a workflow definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowValidationResult {
    pub valid: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub stats: ValidationStats,
}

impl WorkflowValidationResult {
    /// Build a result; `valid` is derived from the error list
    pub fn from_issues(errors: Vec<Issue>, warnings: Vec<Issue>, stats: ValidationStats) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
            stats,
        }
    }

    /// Message of the first error, if any
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|issue| issue.message.as_str())
    }
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_wire_format() {
        let node = Node::new("n1", "click", Position::new(10.0, 20.0))
            .with_data(json!({"selector": "#go"}));
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "click");
        assert_eq!(value["position"]["x"], 10.0);
        assert!(value.get("selected").is_none());

        let parsed: Node = serde_json::from_value(json!({"id": "n2", "type": "wait"})).unwrap();
        assert!(!parsed.is_placed());
        assert_eq!(parsed.data, json!({}));
    }

    #[test]
    fn test_edge_wire_format_is_camel_case() {
        let mut edge = Edge::new("e1", "a", "b");
        edge.source_handle = Some("branch-true".to_string());
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["sourceHandle"], "branch-true");
        assert!(value.get("targetHandle").is_none());
        assert!(value.get("label").is_none());
    }

    #[test]
    fn test_settings_keep_unknown_keys() {
        let settings: WorkflowSettings = serde_json::from_value(json!({
            "executionViewport": {"width": 1920, "height": 1080, "preset": "desktop"},
            "timeoutMs": 30000
        }))
        .unwrap();
        assert_eq!(settings.extra.get("timeoutMs"), Some(&json!(30000)));
        assert!(settings.execution_viewport.is_some());
    }

    #[test]
    fn test_chain_ends() {
        let nodes = vec![
            Node::new("a", "navigate", Position::default()),
            Node::new("b", "click", Position::default()),
        ];
        let edges = vec![Edge::new("e1", "a", "b")];
        let ends: Vec<&str> = chain_ends(&nodes, &edges).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ends, vec!["b"]);
    }

    #[test]
    fn test_valid_iff_no_errors() {
        let warn_only = WorkflowValidationResult::from_issues(
            vec![],
            vec![Issue::new("Node 'x' is unreachable")],
            ValidationStats::default(),
        );
        assert!(warn_only.valid);

        let failed = WorkflowValidationResult::from_issues(
            vec![Issue::at("Duplicate node id 'a'", "nodes[1].id")],
            vec![],
            ValidationStats::default(),
        );
        assert!(!failed.valid);
        assert_eq!(failed.first_error(), Some("Duplicate node id 'a'"));
    }
}
