//! Workflow definition validation
//!
//! Structural checks run locally and split into blocking errors (duplicate
//! IDs, dangling edges, unknown types) and non-blocking warnings
//! (unreachable or isolated nodes, unintended cycles, missing metadata).
//! An optional external schema service is consulted afterwards and its
//! findings merged in.
//!
//! Every call takes a request token; if a newer call started while this one
//! was suspended, the result is reported as superseded and must be
//! discarded by the caller.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;

use crate::edge_semantics::is_loop_back_handle;
use crate::error::Result;
use crate::registry::{NodeTypeLookup, CONDITION_NODE_TYPE, LOOP_NODE_TYPE};
use crate::request::RequestTracker;
use crate::types::{Edge, Issue, ValidationStats, WorkflowDefinition, WorkflowValidationResult};

/// Blocking validation failure with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two nodes share an ID
    DuplicateNodeId { node_id: String, index: usize },
    /// Two edges share an ID
    DuplicateEdgeId { edge_id: String, index: usize },
    /// An edge references a non-existent node
    UnknownNode {
        edge_id: String,
        index: usize,
        endpoint: &'static str,
        node_id: String,
    },
    /// A node has an empty type
    MissingNodeType { node_id: String, index: usize },
    /// A node has a type the registry does not know
    UnknownNodeType {
        node_id: String,
        index: usize,
        node_type: String,
    },
}

impl ValidationError {
    /// JSON path of the offending field
    pub fn path(&self) -> String {
        match self {
            Self::DuplicateNodeId { index, .. } => format!("nodes[{}].id", index),
            Self::DuplicateEdgeId { index, .. } => format!("edges[{}].id", index),
            Self::UnknownNode { index, endpoint, .. } => format!("edges[{}].{}", index, endpoint),
            Self::MissingNodeType { index, .. } | Self::UnknownNodeType { index, .. } => {
                format!("nodes[{}].type", index)
            }
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id, .. } => write!(f, "Duplicate node id '{}'", node_id),
            Self::DuplicateEdgeId { edge_id, .. } => write!(f, "Duplicate edge id '{}'", edge_id),
            Self::UnknownNode {
                edge_id, node_id, ..
            } => write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id),
            Self::MissingNodeType { node_id, .. } => write!(f, "Node '{}' has no type", node_id),
            Self::UnknownNodeType {
                node_id, node_type, ..
            } => write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Non-blocking finding
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// The workflow has no nodes
    EmptyWorkflow,
    /// No path from any root reaches this node
    UnreachableNode { node_id: String, index: usize },
    /// The node has no edges while others exist
    IsolatedNode { node_id: String, index: usize },
    /// A node has no canvas position
    UnplacedNode { node_id: String, index: usize },
    /// A cycle exists that is not closed through a loop handle
    CycleDetected,
    /// The definition carries no metadata object
    MissingMetadata,
}

impl ValidationWarning {
    pub fn path(&self) -> Option<String> {
        match self {
            Self::UnreachableNode { index, .. } | Self::IsolatedNode { index, .. } => {
                Some(format!("nodes[{}]", index))
            }
            Self::UnplacedNode { index, .. } => Some(format!("nodes[{}].position", index)),
            Self::EmptyWorkflow => Some("nodes".to_string()),
            Self::MissingMetadata => Some("metadata".to_string()),
            Self::CycleDetected => None,
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyWorkflow => write!(f, "Workflow has no nodes"),
            Self::UnreachableNode { node_id, .. } => {
                write!(f, "Node '{}' is not reachable from any start node", node_id)
            }
            Self::IsolatedNode { node_id, .. } => write!(f, "Node '{}' has no connections", node_id),
            Self::UnplacedNode { node_id, .. } => write!(f, "Node '{}' has no position", node_id),
            Self::CycleDetected => write!(f, "Cycle detected outside of a loop node"),
            Self::MissingMetadata => write!(f, "Workflow has no metadata"),
        }
    }
}

impl From<ValidationError> for Issue {
    fn from(error: ValidationError) -> Self {
        Issue::at(error.to_string(), error.path())
    }
}

impl From<ValidationWarning> for Issue {
    fn from(warning: ValidationWarning) -> Self {
        Issue {
            message: warning.to_string(),
            path: warning.path(),
        }
    }
}

/// External schema validation service
#[async_trait]
pub trait SchemaService: Send + Sync {
    async fn validate(&self, definition: &WorkflowDefinition) -> Result<WorkflowValidationResult>;
}

/// Result of an asynchronous validation call
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// This call is still the latest; its result may be applied
    Completed(WorkflowValidationResult),
    /// A newer call started meanwhile; discard
    Superseded,
}

impl ValidationOutcome {
    pub fn into_result(self) -> Option<WorkflowValidationResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Superseded => None,
        }
    }
}

/// Validates workflow definitions against structure, registry and schema
#[derive(Default)]
pub struct Validator {
    registry: Option<Arc<dyn NodeTypeLookup>>,
    schema: Option<Arc<dyn SchemaService>>,
    requests: RequestTracker,
}

impl Validator {
    /// Structural checks only
    pub fn new() -> Self {
        Self::default()
    }

    /// Also check node types against a registry
    pub fn with_registry(mut self, registry: Arc<dyn NodeTypeLookup>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Also consult an external schema service
    pub fn with_schema_service(mut self, schema: Arc<dyn SchemaService>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Run the local checks synchronously
    pub fn validate_structure(&self, definition: &WorkflowDefinition) -> WorkflowValidationResult {
        validate_definition(definition, self.registry.as_deref())
    }

    /// Validate a snapshot of the definition.
    ///
    /// A newer call supersedes this one; superseded results are never
    /// returned as `Completed`. Schema service failures propagate unless
    /// the call was already superseded.
    pub async fn validate(&self, definition: WorkflowDefinition) -> Result<ValidationOutcome> {
        let token = self.requests.issue();
        let mut result = self.validate_structure(&definition);

        if let Some(schema) = &self.schema {
            let remote = schema.validate(&definition).await;
            if !self.requests.is_latest(token) {
                log::debug!("Discarding superseded validation #{}", token.value());
                return Ok(ValidationOutcome::Superseded);
            }
            merge_results(&mut result, remote?);
        }

        if !self.requests.is_latest(token) {
            return Ok(ValidationOutcome::Superseded);
        }
        Ok(ValidationOutcome::Completed(result))
    }

    /// Supersede any in-flight validation
    pub fn cancel(&self) {
        self.requests.invalidate();
    }
}

/// Validate a workflow definition.
///
/// Returns every finding, not just the first.
pub fn validate_definition(
    definition: &WorkflowDefinition,
    registry: Option<&dyn NodeTypeLookup>,
) -> WorkflowValidationResult {
    let mut errors: Vec<ValidationError> = Vec::new();
    let mut warnings: Vec<ValidationWarning> = Vec::new();

    validate_ids(definition, &mut errors);
    validate_node_types(definition, registry, &mut errors);
    validate_edge_references(definition, &mut errors);

    if definition.nodes.is_empty() {
        warnings.push(ValidationWarning::EmptyWorkflow);
    }
    check_reachability(definition, &mut warnings);
    detect_cycles(definition, &mut warnings);
    for (index, node) in definition.nodes.iter().enumerate() {
        if !node.is_placed() {
            warnings.push(ValidationWarning::UnplacedNode {
                node_id: node.id.clone(),
                index,
            });
        }
    }
    if definition.metadata.is_none() {
        warnings.push(ValidationWarning::MissingMetadata);
    }

    WorkflowValidationResult::from_issues(
        errors.into_iter().map(Issue::from).collect(),
        warnings.into_iter().map(Issue::from).collect(),
        collect_stats(definition),
    )
}

fn validate_ids(definition: &WorkflowDefinition, errors: &mut Vec<ValidationError>) {
    let mut seen: HashSet<&str> = HashSet::new();
    for (index, node) in definition.nodes.iter().enumerate() {
        if !seen.insert(&node.id) {
            errors.push(ValidationError::DuplicateNodeId {
                node_id: node.id.clone(),
                index,
            });
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for (index, edge) in definition.edges.iter().enumerate() {
        if !seen.insert(&edge.id) {
            errors.push(ValidationError::DuplicateEdgeId {
                edge_id: edge.id.clone(),
                index,
            });
        }
    }
}

fn validate_node_types(
    definition: &WorkflowDefinition,
    registry: Option<&dyn NodeTypeLookup>,
    errors: &mut Vec<ValidationError>,
) {
    for (index, node) in definition.nodes.iter().enumerate() {
        if node.node_type.is_empty() {
            errors.push(ValidationError::MissingNodeType {
                node_id: node.id.clone(),
                index,
            });
        } else if let Some(registry) = registry {
            if !registry.has_node_type(&node.node_type) {
                errors.push(ValidationError::UnknownNodeType {
                    node_id: node.id.clone(),
                    index,
                    node_type: node.node_type.clone(),
                });
            }
        }
    }
}

/// Check that all edge source/target nodes exist
fn validate_edge_references(definition: &WorkflowDefinition, errors: &mut Vec<ValidationError>) {
    let node_ids: HashSet<&str> = definition.nodes.iter().map(|n| n.id.as_str()).collect();

    for (index, edge) in definition.edges.iter().enumerate() {
        for (endpoint, node_id) in [("source", &edge.source), ("target", &edge.target)] {
            if !node_ids.contains(node_id.as_str()) {
                errors.push(ValidationError::UnknownNode {
                    edge_id: edge.id.clone(),
                    index,
                    endpoint,
                    node_id: node_id.clone(),
                });
            }
        }
    }
}

/// Edges that define forward flow (loop back-edges excluded)
fn forward_edges(definition: &WorkflowDefinition) -> impl Iterator<Item = &Edge> {
    definition.edges.iter().filter(|e| {
        e.source != e.target && !e.target_handle.as_deref().is_some_and(is_loop_back_handle)
    })
}

fn check_reachability(definition: &WorkflowDefinition, warnings: &mut Vec<ValidationWarning>) {
    let mut in_degree: HashMap<&str, usize> =
        definition.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in forward_edges(definition) {
        if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
            *degree += 1;
        }
        children.entry(&edge.source).or_default().push(&edge.target);
    }

    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    while let Some(id) = queue.pop_front() {
        if reachable.insert(id) {
            queue.extend(children.get(id).into_iter().flatten().copied());
        }
    }

    let connected: HashSet<&str> = definition
        .edges
        .iter()
        .flat_map(|e| [e.source.as_str(), e.target.as_str()])
        .collect();

    for (index, node) in definition.nodes.iter().enumerate() {
        if !reachable.contains(node.id.as_str()) {
            warnings.push(ValidationWarning::UnreachableNode {
                node_id: node.id.clone(),
                index,
            });
        } else if definition.nodes.len() > 1 && !connected.contains(node.id.as_str()) {
            warnings.push(ValidationWarning::IsolatedNode {
                node_id: node.id.clone(),
                index,
            });
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn detect_cycles(definition: &WorkflowDefinition, warnings: &mut Vec<ValidationWarning>) {
    let mut in_degree: HashMap<&str, usize> =
        definition.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let edges: Vec<&Edge> = forward_edges(definition)
        .filter(|e| in_degree.contains_key(e.source.as_str()))
        .collect();
    for edge in &edges {
        if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        for edge in &edges {
            if edge.source == node_id {
                if let Some(deg) = in_degree.get_mut(edge.target.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(&edge.target);
                    }
                }
            }
        }
    }

    if visited < in_degree.len() {
        warnings.push(ValidationWarning::CycleDetected);
    }
}

fn collect_stats(definition: &WorkflowDefinition) -> ValidationStats {
    let targets: HashSet<&str> = forward_edges(definition).map(|e| e.target.as_str()).collect();
    ValidationStats {
        node_count: definition.nodes.len(),
        edge_count: definition.edges.len(),
        root_count: definition
            .nodes
            .iter()
            .filter(|n| !targets.contains(n.id.as_str()))
            .count(),
        branch_count: count_type(definition, CONDITION_NODE_TYPE),
        loop_count: count_type(definition, LOOP_NODE_TYPE),
        extra: Default::default(),
    }
}

fn count_type(definition: &WorkflowDefinition, node_type: &str) -> usize {
    definition.nodes.iter().filter(|n| n.node_type == node_type).count()
}

/// Fold a schema service result into the local one
fn merge_results(local: &mut WorkflowValidationResult, remote: WorkflowValidationResult) {
    local.errors.extend(remote.errors);
    local.warnings.extend(remote.warnings);
    local.stats.extra.extend(remote.stats.extra);
    local.valid = local.errors.is_empty();
}
