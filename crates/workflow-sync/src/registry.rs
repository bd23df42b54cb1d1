//! Node-type registry
//!
//! The engine only needs to know whether a referenced `type` exists; how a
//! node renders or executes lives elsewhere. The registry keeps a small
//! descriptor per type so callers (palette listings, the validator) share a
//! single source of truth.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Node type used for branching (emits `branch-true` / `branch-false`)
pub const CONDITION_NODE_TYPE: &str = "condition";

/// Node type used for looping (emits `loop-body` / `loop-after`)
pub const LOOP_NODE_TYPE: &str = "loop";

/// Opaque lookup used to validate that referenced node types exist
pub trait NodeTypeLookup: Send + Sync {
    fn has_node_type(&self, node_type: &str) -> bool;
}

/// Category of a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry points (start, schedule)
    Trigger,
    /// Browser interactions (navigate, click, type)
    Action,
    /// Data extraction and transformation
    Data,
    /// Branching and looping
    Control,
    /// Terminal nodes
    Output,
}

/// Definition descriptor for a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeDescriptor {
    /// Unique type identifier (e.g., "click")
    pub node_type: String,
    /// Human-readable label
    pub label: String,
    /// Category for grouping in UI
    pub category: NodeCategory,
    #[serde(default)]
    pub description: String,
}

impl NodeTypeDescriptor {
    pub fn new(node_type: impl Into<String>, label: impl Into<String>, category: NodeCategory) -> Self {
        Self {
            node_type: node_type.into(),
            label: label.into(),
            category,
            description: String::new(),
        }
    }
}

/// Registry of known node types
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    entries: HashMap<String, NodeTypeDescriptor>,
}

impl NodeTypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in browser-automation types
    pub fn with_builtin_types() -> Self {
        use NodeCategory::*;

        let mut registry = Self::new();
        for (node_type, label, category) in [
            ("start", "Start", Trigger),
            ("navigate", "Navigate", Action),
            ("click", "Click", Action),
            ("type", "Type Text", Action),
            ("select", "Select Option", Action),
            ("scroll", "Scroll", Action),
            ("hover", "Hover", Action),
            ("wait", "Wait", Action),
            ("screenshot", "Screenshot", Data),
            ("extract", "Extract Data", Data),
            ("set-variable", "Set Variable", Data),
            (CONDITION_NODE_TYPE, "Condition", Control),
            (LOOP_NODE_TYPE, "Loop", Control),
            ("end", "End", Output),
        ] {
            registry.register(NodeTypeDescriptor::new(node_type, label, category));
        }
        registry
    }

    /// Register (or replace) a node type
    pub fn register(&mut self, descriptor: NodeTypeDescriptor) {
        self.entries.insert(descriptor.node_type.clone(), descriptor);
    }

    /// Get the descriptor for a node type
    pub fn get(&self, node_type: &str) -> Option<&NodeTypeDescriptor> {
        self.entries.get(node_type)
    }

    /// All registered descriptors, sorted by type for stable listings
    pub fn all(&self) -> Vec<&NodeTypeDescriptor> {
        let mut all: Vec<_> = self.entries.values().collect();
        all.sort_by(|a, b| a.node_type.cmp(&b.node_type));
        all
    }

    /// Merge another registry into this one; entries from `other` win
    pub fn merge(&mut self, other: NodeTypeRegistry) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NodeTypeLookup for NodeTypeRegistry {
    fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types() {
        let registry = NodeTypeRegistry::with_builtin_types();
        assert!(registry.has_node_type("click"));
        assert!(registry.has_node_type(CONDITION_NODE_TYPE));
        assert!(!registry.has_node_type("teleport"));
        assert_eq!(registry.get("loop").unwrap().category, NodeCategory::Control);
    }

    #[test]
    fn test_merge_overrides() {
        let mut registry = NodeTypeRegistry::with_builtin_types();
        let before = registry.len();

        let mut plugins = NodeTypeRegistry::new();
        plugins.register(NodeTypeDescriptor::new("click", "Smart Click", NodeCategory::Action));
        plugins.register(NodeTypeDescriptor::new("upload", "Upload File", NodeCategory::Action));
        registry.merge(plugins);

        assert_eq!(registry.len(), before + 1);
        assert_eq!(registry.get("click").unwrap().label, "Smart Click");
    }

    #[test]
    fn test_all_is_sorted() {
        let registry = NodeTypeRegistry::with_builtin_types();
        let types: Vec<&str> = registry.all().iter().map(|d| d.node_type.as_str()).collect();
        let mut sorted = types.clone();
        sorted.sort();
        assert_eq!(types, sorted);
    }
}
