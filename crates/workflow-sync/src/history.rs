//! Undo/redo history using compressed snapshots
//!
//! Each entry is an immutable `{nodes, edges}` snapshot serialized and
//! zstd-compressed on the way in and decoded into a fresh copy on the way
//! out, so the live graph never shares memory with the history.
//!
//! The cursor (`history_index`) ranges over `[-1, len - 1]`; `-1` means the
//! history is empty.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::constants::history::MAX_ENTRIES;
use crate::error::{Result, WorkflowSyncError};
use crate::types::{Edge, Node};

/// zstd level for snapshots; favours speed over ratio
const COMPRESSION_LEVEL: i32 = 3;

/// A snapshot of the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Bounded undo/redo stack
pub struct HistoryManager {
    /// Compressed graph states (zstd)
    snapshots: VecDeque<Vec<u8>>,
    /// Current position in the stack (`None` when empty)
    cursor: Option<usize>,
    /// Maximum number of snapshots to keep
    max_entries: usize,
}

impl HistoryManager {
    /// Create a history holding at most `max_entries` snapshots
    pub fn new(max_entries: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            cursor: None,
            max_entries: max_entries.max(1),
        }
    }

    /// Record a snapshot of the graph.
    ///
    /// Truncates any redo tail past the cursor, appends, advances the cursor
    /// and evicts the oldest entry once the limit is exceeded.
    pub fn snapshot(&mut self, nodes: &[Node], edges: &[Edge]) -> Result<()> {
        let compressed = compress(nodes, edges)?;

        let keep = self.cursor.map_or(0, |c| c + 1);
        self.snapshots.truncate(keep);

        self.snapshots.push_back(compressed);
        self.cursor = Some(self.snapshots.len() - 1);

        while self.snapshots.len() > self.max_entries {
            self.snapshots.pop_front();
            self.cursor = self.cursor.map(|c| c.saturating_sub(1));
        }

        Ok(())
    }

    /// Step back one snapshot.
    ///
    /// Returns `None` when the cursor is at (or before) the oldest entry. A
    /// snapshot that fails to decode leaves the cursor where it was.
    pub fn undo(&mut self) -> Option<Result<HistoryEntry>> {
        let target = self.cursor.filter(|&c| c > 0)? - 1;
        Some(self.move_to(target))
    }

    /// Step forward one snapshot.
    ///
    /// Returns `None` when the cursor is at the newest entry.
    pub fn redo(&mut self) -> Option<Result<HistoryEntry>> {
        let target = self.cursor.map_or(0, |c| c + 1);
        if target >= self.snapshots.len() || self.cursor.is_none() {
            return None;
        }
        Some(self.move_to(target))
    }

    /// Drop all history and record a new baseline
    pub fn reset(&mut self, nodes: &[Node], edges: &[Edge]) -> Result<()> {
        self.clear();
        self.snapshot(nodes, edges)
    }

    /// Get the entry under the cursor without moving it
    pub fn current(&self) -> Option<Result<HistoryEntry>> {
        self.cursor.map(|c| self.decompress(c))
    }

    /// Cursor position, `-1` when empty
    pub fn history_index(&self) -> isize {
        self.cursor.map_or(-1, |c| c as isize)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.snapshots.len())
    }

    /// Get the number of snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the stack is empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Clear all snapshots
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = None;
    }

    /// Get the total compressed size of all snapshots
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(|s| s.len()).sum()
    }

    fn move_to(&mut self, index: usize) -> Result<HistoryEntry> {
        let entry = self.decompress(index)?;
        self.cursor = Some(index);
        Ok(entry)
    }

    fn decompress(&self, index: usize) -> Result<HistoryEntry> {
        let compressed = &self.snapshots[index];
        let json = zstd::decode_all(&compressed[..])
            .map_err(|e| WorkflowSyncError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(MAX_ENTRIES)
    }
}

fn compress(nodes: &[Node], edges: &[Edge]) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct EntryRef<'a> {
        nodes: &'a [Node],
        edges: &'a [Edge],
    }

    let json = serde_json::to_vec(&EntryRef { nodes, edges })?;
    zstd::encode_all(&json[..], COMPRESSION_LEVEL).map_err(|e| WorkflowSyncError::Compression(e.to_string()))
}
