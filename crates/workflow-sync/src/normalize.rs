//! Canonicalization of raw node/edge collections
//!
//! Normalization never fails: entries that cannot be resolved are filtered
//! out and the caller decides whether to report how many were dropped.
//!
//! Duplicate IDs are resolved with an explicit tie-break: the last
//! occurrence's content wins, kept in the slot of the first occurrence.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde_json::Value;

use crate::config::LayoutConfig;
use crate::edge_semantics::{annotate_edge, connection_edge_id, is_loop_back_handle};
use crate::types::{empty_object, Connection, Edge, Node, Position, WorkflowDefinition};

/// Counts of entries removed during normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    pub dropped_nodes: usize,
    pub dropped_edges: usize,
}

/// Normalize raw JSON node entries.
///
/// Fills missing `data` with `{}`, leaves missing positions unplaced for
/// [`auto_layout_nodes`], drops entries without an `id` or a resolvable
/// `type`, and de-duplicates by `id`.
pub fn normalize_nodes(raw_nodes: &[Value]) -> Vec<Node> {
    let parsed = raw_nodes
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let node = parse_node(raw);
            if node.is_none() {
                log::debug!("Dropping unresolvable node at index {}", index);
            }
            node
        })
        .collect();
    dedup_by_id(parsed, |n: &Node| n.id.as_str())
}

/// Normalize raw JSON edge entries against an already-normalized node set.
///
/// Drops edges whose endpoints are missing, de-duplicates by `id`, and
/// re-derives condition metadata from the handles.
pub fn normalize_edges(raw_edges: &[Value], nodes: &[Node]) -> Vec<Edge> {
    let parsed = raw_edges
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let edge = parse_edge(raw);
            if edge.is_none() {
                log::debug!("Dropping unresolvable edge at index {}", index);
            }
            edge
        })
        .collect();
    filter_edges(parsed, nodes)
}

/// Normalize an already-typed definition (e.g. one loaded from the store)
pub fn normalize_definition(definition: WorkflowDefinition) -> (WorkflowDefinition, NormalizationReport) {
    let WorkflowDefinition {
        nodes,
        edges,
        metadata,
        settings,
    } = definition;

    let node_input = nodes.len();
    let edge_input = edges.len();

    let nodes: Vec<Node> = nodes
        .into_iter()
        .filter(|n| !n.id.is_empty() && !n.node_type.is_empty())
        .map(|mut node| {
            if !node.data.is_object() {
                node.data = empty_object();
            }
            node
        })
        .collect();
    let nodes = dedup_by_id(nodes, |n: &Node| n.id.as_str());
    let edges = edges
        .into_iter()
        .map(|mut edge| {
            edge.source_handle = edge.source_handle.filter(|h| !h.is_empty());
            edge.target_handle = edge.target_handle.filter(|h| !h.is_empty());
            if edge.id.is_empty() {
                edge.id = connection_edge_id(&Connection {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    source_handle: edge.source_handle.clone(),
                    target_handle: edge.target_handle.clone(),
                });
            }
            edge
        })
        .collect();
    let edges = filter_edges(edges, &nodes);

    let report = NormalizationReport {
        dropped_nodes: node_input - nodes.len(),
        dropped_edges: edge_input - edges.len(),
    };
    (
        WorkflowDefinition {
            nodes,
            edges,
            metadata,
            settings,
        },
        report,
    )
}

/// Assign deterministic coordinates to nodes lacking a position.
///
/// Nodes are ranked by breadth-first depth from root nodes (no incoming
/// edges) and laid out in columns by depth, rows ordered by ID. Loop
/// back-edges are ignored so a loop node keeps its place in the chain;
/// nodes only reachable through a cycle seed an extra traversal from the
/// smallest unvisited ID. Placed nodes keep their positions and output order
/// follows input order.
pub fn auto_layout_nodes(nodes: &[Node], edges: &[Edge]) -> Vec<Node> {
    auto_layout_nodes_with(nodes, edges, &LayoutConfig::default())
}

/// [`auto_layout_nodes`] with explicit spacing
pub fn auto_layout_nodes_with(nodes: &[Node], edges: &[Edge], config: &LayoutConfig) -> Vec<Node> {
    if nodes.iter().all(Node::is_placed) {
        return nodes.to_vec();
    }

    let ids: BTreeSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut children: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut in_degree: BTreeMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();

    for edge in edges {
        let (source, target) = (edge.source.as_str(), edge.target.as_str());
        if source == target || !ids.contains(source) || !ids.contains(target) {
            continue;
        }
        if edge.target_handle.as_deref().is_some_and(is_loop_back_handle) {
            continue;
        }
        if children.entry(source).or_default().insert(target) {
            if let Some(degree) = in_degree.get_mut(target) {
                *degree += 1;
            }
        }
    }

    let mut depth: HashMap<&str, usize> = HashMap::new();
    let roots: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();
    bfs_depths(&roots, &children, &mut depth);

    // Anything left sits on a cycle with no root leading into it
    for id in &ids {
        if !depth.contains_key(id) {
            bfs_depths(&[*id], &children, &mut depth);
        }
    }

    let mut columns: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for id in &ids {
        columns.entry(depth[id]).or_default().push(*id);
    }

    let mut slots: HashMap<&str, Position> = HashMap::new();
    for (column, members) in &columns {
        for (row, id) in members.iter().enumerate() {
            slots.insert(
                *id,
                Position::new(
                    config.origin_x + *column as f64 * config.horizontal_spacing,
                    config.origin_y + row as f64 * config.vertical_spacing,
                ),
            );
        }
    }

    nodes
        .iter()
        .map(|node| {
            let mut node = node.clone();
            if node.position.is_none() {
                node.position = slots.get(node.id.as_str()).copied();
            }
            node
        })
        .collect()
}

fn bfs_depths<'a>(
    roots: &[&'a str],
    children: &BTreeMap<&'a str, BTreeSet<&'a str>>,
    depth: &mut HashMap<&'a str, usize>,
) {
    let mut queue: VecDeque<&'a str> = VecDeque::new();
    for root in roots {
        if !depth.contains_key(root) {
            depth.insert(*root, 0);
            queue.push_back(*root);
        }
    }
    while let Some(id) = queue.pop_front() {
        let next = depth[id] + 1;
        for child in children.get(id).into_iter().flatten() {
            if !depth.contains_key(child) {
                depth.insert(*child, next);
                queue.push_back(*child);
            }
        }
    }
}

fn filter_edges(edges: Vec<Edge>, nodes: &[Node]) -> Vec<Edge> {
    let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let kept = edges
        .into_iter()
        .filter(|edge| {
            let keep = node_ids.contains(edge.source.as_str()) && node_ids.contains(edge.target.as_str());
            if !keep {
                log::debug!(
                    "Dropping edge '{}' ({} -> {}): endpoint missing",
                    edge.id,
                    edge.source,
                    edge.target
                );
            }
            keep
        })
        .map(|mut edge| {
            annotate_edge(&mut edge);
            edge
        })
        .collect();
    dedup_by_id(kept, |e: &Edge| e.id.as_str())
}

fn dedup_by_id<T>(items: Vec<T>, id_of: impl Fn(&T) -> &str) -> Vec<T> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let id = id_of(&item).to_string();
        match slots.get(&id) {
            Some(&slot) => {
                log::debug!("Duplicate id '{}': keeping last occurrence", id);
                out[slot] = item;
            }
            None => {
                slots.insert(id, out.len());
                out.push(item);
            }
        }
    }
    out
}

fn parse_node(raw: &Value) -> Option<Node> {
    let object = raw.as_object()?;
    let id = id_string(object.get("id")?)?;
    let data = match object.get("data") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => empty_object(),
    };
    let node_type = object
        .get("type")
        .and_then(Value::as_str)
        .or_else(|| data.get("type").and_then(Value::as_str))
        .filter(|t| !t.is_empty())?
        .to_string();

    Some(Node {
        id,
        node_type,
        position: object.get("position").and_then(parse_position),
        data,
        selected: object.get("selected").and_then(Value::as_bool),
    })
}

fn parse_position(raw: &Value) -> Option<Position> {
    let x = raw.get("x")?.as_f64()?;
    let y = raw.get("y")?.as_f64()?;
    (x.is_finite() && y.is_finite()).then(|| Position::new(x, y))
}

fn parse_edge(raw: &Value) -> Option<Edge> {
    let object = raw.as_object()?;
    let source = id_string(object.get("source")?)?;
    let target = id_string(object.get("target")?)?;
    let handle = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
    };
    let source_handle = handle("sourceHandle");
    let target_handle = handle("targetHandle");

    let id = match object.get("id").and_then(id_string) {
        Some(id) => id,
        None => connection_edge_id(&Connection {
            source: source.clone(),
            target: target.clone(),
            source_handle: source_handle.clone(),
            target_handle: target_handle.clone(),
        }),
    };

    let mut edge = Edge::new(id, source, target);
    edge.source_handle = source_handle;
    edge.target_handle = target_handle;
    Some(edge)
}

/// IDs may arrive as strings or numbers; anything else is unresolvable
fn id_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
