//! Edge condition metadata derived from handle identifiers
//!
//! Branching and looping nodes expose well-known handles. An edge leaving
//! (or entering) one of them carries a condition tag, a label and a stroke
//! colour. These are always recomputed from the handles and never stored as
//! user input.
//!
//! Precedence: source-handle metadata is applied first, then target-handle
//! metadata; when both apply the target wins.

use crate::types::{Connection, Edge, EdgeData, EdgeStyle};

/// Stroke width for annotated edges
const CONDITION_STROKE_WIDTH: f64 = 2.0;

/// Annotation for an edge attached to a well-known handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionMeta {
    pub condition: &'static str,
    pub label: &'static str,
    pub stroke_color: &'static str,
}

const fn meta(condition: &'static str, label: &'static str, stroke_color: &'static str) -> ConditionMeta {
    ConditionMeta {
        condition,
        label,
        stroke_color,
    }
}

/// Handles that originate an annotated edge
const SOURCE_HANDLES: &[(&str, ConditionMeta)] = &[
    ("branch-true", meta("true", "True", "#22c55e")),
    ("branch-false", meta("false", "False", "#ef4444")),
    ("loop-body", meta("loop_body", "Loop", "#8b5cf6")),
    ("loop-after", meta("loop_after", "Done", "#64748b")),
];

/// Handles that terminate an annotated edge (back-edges into a loop node)
const TARGET_HANDLES: &[(&str, ConditionMeta)] = &[
    ("loop-continue", meta("continue", "Continue", "#0ea5e9")),
    ("loop-break", meta("break", "Break", "#f97316")),
];

/// Metadata for a source handle; `None` for unknown handles
pub fn derive_source_condition(source_handle: &str) -> Option<ConditionMeta> {
    lookup(SOURCE_HANDLES, source_handle)
}

/// Metadata for a target handle; `None` for unknown handles
pub fn derive_target_condition(target_handle: &str) -> Option<ConditionMeta> {
    lookup(TARGET_HANDLES, target_handle)
}

/// Whether a target handle closes a loop (edge is an intended back-edge)
pub fn is_loop_back_handle(target_handle: &str) -> bool {
    derive_target_condition(target_handle).is_some()
}

fn lookup(table: &[(&str, ConditionMeta)], handle: &str) -> Option<ConditionMeta> {
    table
        .iter()
        .find(|(id, _)| *id == handle)
        .map(|(_, meta)| *meta)
}

/// Deterministic edge ID for a connection
pub fn connection_edge_id(connection: &Connection) -> String {
    format!(
        "edge-{}-{}-{}-{}",
        connection.source,
        connection.source_handle.as_deref().unwrap_or("out"),
        connection.target,
        connection.target_handle.as_deref().unwrap_or("in"),
    )
}

/// Turn an editor connection into an annotated edge
pub fn enhance_connection(connection: &Connection) -> Edge {
    let mut edge = Edge::new(
        connection_edge_id(connection),
        connection.source.clone(),
        connection.target.clone(),
    );
    edge.source_handle = connection.source_handle.clone();
    edge.target_handle = connection.target_handle.clone();
    annotate_edge(&mut edge);
    edge
}

/// Recompute `data`/`label`/`style` from the edge's handles.
///
/// Edges whose handles carry no semantics end up with all three cleared.
pub fn annotate_edge(edge: &mut Edge) {
    let source = edge.source_handle.as_deref().and_then(derive_source_condition);
    let target = edge.target_handle.as_deref().and_then(derive_target_condition);

    match target.or(source) {
        Some(meta) => {
            edge.data = Some(EdgeData {
                condition: Some(meta.condition.to_string()),
            });
            edge.label = Some(meta.label.to_string());
            edge.style = Some(EdgeStyle {
                stroke: meta.stroke_color.to_string(),
                stroke_width: CONDITION_STROKE_WIDTH,
            });
        }
        None => {
            edge.data = None;
            edge.label = None;
            edge.style = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_source_handles() {
        let meta = derive_source_condition("branch-true").unwrap();
        assert_eq!(meta.condition, "true");
        assert_eq!(meta.label, "True");

        assert_eq!(derive_source_condition("loop-body").unwrap().condition, "loop_body");
        assert_eq!(derive_source_condition("loop-after").unwrap().label, "Done");
    }

    #[test]
    fn test_unknown_handles_yield_none() {
        assert!(derive_source_condition("output").is_none());
        assert!(derive_source_condition("").is_none());
        assert!(derive_target_condition("branch-true").is_none());
        assert!(derive_source_condition("loop-continue").is_none());
    }

    #[test]
    fn test_enhance_plain_connection() {
        let edge = enhance_connection(&Connection::new("a", "b"));
        assert_eq!(edge.id, "edge-a-out-b-in");
        assert_eq!(edge.source, "a");
        assert_eq!(edge.target, "b");
        assert!(edge.data.is_none());
        assert!(edge.label.is_none());
        assert!(edge.style.is_none());
    }

    #[test]
    fn test_enhance_branch_connection() {
        let connection = Connection::new("cond", "click").with_handles(Some("branch-false"), None);
        let edge = enhance_connection(&connection);
        assert_eq!(edge.condition(), Some("false"));
        assert_eq!(edge.label.as_deref(), Some("False"));
        assert_eq!(edge.style.as_ref().unwrap().stroke, "#ef4444");
    }

    #[test]
    fn test_target_overrides_source() {
        let connection = Connection::new("loop", "loop")
            .with_handles(Some("loop-body"), Some("loop-continue"));
        let edge = enhance_connection(&connection);
        assert_eq!(edge.condition(), Some("continue"));
        assert_eq!(edge.label.as_deref(), Some("Continue"));
        assert_eq!(edge.style.as_ref().unwrap().stroke, "#0ea5e9");
    }

    #[test]
    fn test_annotate_clears_stale_metadata() {
        let mut edge = enhance_connection(
            &Connection::new("cond", "x").with_handles(Some("branch-true"), None),
        );
        edge.source_handle = Some("output".to_string());
        annotate_edge(&mut edge);
        assert!(edge.data.is_none());
        assert!(edge.label.is_none());
        assert!(edge.style.is_none());
    }
}
