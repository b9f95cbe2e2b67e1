//! Arena-backed widget tree with a key→widget index.
//!
//! Nodes live in append-only slots for the lifetime of a connection (the
//! whole tree is discarded on reconnect); removal vacates the slot and
//! evicts the key from the index, so stale ids resolve to `None` rather
//! than to recycled widgets.

use log::debug;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::widget::{Control, WidgetKey};

/// Number of top-level layout columns the renderer distributes modules over.
pub const SCREEN_COLUMNS: usize = 4;

/// Handle into the widget arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WidgetId(usize);

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("widget not found: {0:?}")]
    Missing(WidgetId),
    #[error("widget is not a table: {0}")]
    NotATable(String),
    #[error("row {row} out of range for table {table}")]
    RowOutOfRange { table: String, row: usize },
}

/// One materialized widget.
#[derive(Clone, Debug)]
pub struct ViewNode {
    pub key: WidgetKey,
    pub control: Control,
    /// Label shown next to the control; empty for table cells.
    pub label: String,
    pub comment: Option<String>,
    /// Presentation-only visibility; never affects reconciliation indices.
    pub hidden: bool,
    pub children: Vec<WidgetId>,
    pub parent: Option<WidgetId>,
    /// Table nodes only: cell widgets per row, positional identity.
    pub rows: Vec<Vec<WidgetId>>,
}

impl ViewNode {
    pub fn new(key: WidgetKey, control: Control, label: impl Into<String>) -> Self {
        Self {
            key,
            control,
            label: label.into(),
            comment: None,
            hidden: false,
            children: Vec::new(),
            parent: None,
            rows: Vec::new(),
        }
    }
}

/// The materialized view: widget arena, key index, and the four top-level
/// layout columns.
#[derive(Debug, Default)]
pub struct ViewTree {
    slots: Vec<Option<ViewNode>>,
    index: FxHashMap<WidgetKey, WidgetId>,
    columns: [Vec<WidgetId>; SCREEN_COLUMNS],
    next_column: usize,
}

impl ViewTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every widget (reconnect path).
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.columns = Default::default();
        self.next_column = 0;
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn columns(&self) -> &[Vec<WidgetId>; SCREEN_COLUMNS] {
        &self.columns
    }

    /// Insert a widget, registering it under its key. A duplicate key
    /// re-points the index at the newest widget.
    pub fn insert(&mut self, parent: Option<WidgetId>, mut node: ViewNode) -> WidgetId {
        node.parent = parent;
        let key = node.key.clone();
        let id = WidgetId(self.slots.len());
        self.slots.push(Some(node));
        if let Some(previous) = self.index.insert(key.clone(), id) {
            debug!("duplicate widget key {key}, replacing {previous:?}");
        }
        if let Some(parent) = parent {
            if let Some(parent_node) = self.get_mut(parent) {
                parent_node.children.push(id);
            }
        }
        id
    }

    /// Insert a table cell: parented to the table for eviction purposes but
    /// tracked through row storage, not the child list (children are the
    /// column headings).
    pub fn insert_cell(&mut self, table: WidgetId, mut node: ViewNode) -> WidgetId {
        node.parent = Some(table);
        let key = node.key.clone();
        let id = WidgetId(self.slots.len());
        self.slots.push(Some(node));
        if let Some(previous) = self.index.insert(key.clone(), id) {
            debug!("duplicate widget key {key}, replacing {previous:?}");
        }
        id
    }

    /// Assign a root widget to the next layout column, round-robin.
    pub fn place_top_level(&mut self, id: WidgetId) {
        self.columns[self.next_column].push(id);
        self.next_column = (self.next_column + 1) % SCREEN_COLUMNS;
    }

    pub fn get(&self, id: WidgetId) -> Option<&ViewNode> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: WidgetId) -> Option<&mut ViewNode> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    pub fn lookup(&self, key: &WidgetKey) -> Option<WidgetId> {
        self.index.get(key).copied()
    }

    /// Widget for a top-level (non-cell) variable id.
    pub fn node(&self, id: &str) -> Option<WidgetId> {
        self.lookup(&WidgetKey::node(id))
    }

    /// Widget for one table cell.
    pub fn cell(&self, id: &str, row: usize) -> Option<WidgetId> {
        self.lookup(&WidgetKey::cell(id, row))
    }

    fn node_ref(&self, id: WidgetId) -> Result<&ViewNode, ViewError> {
        self.get(id).ok_or(ViewError::Missing(id))
    }

    fn node_mut(&mut self, id: WidgetId) -> Result<&mut ViewNode, ViewError> {
        self.get_mut(id).ok_or(ViewError::Missing(id))
    }

    /// Detach a widget from its parent (or layout column) and evict it and
    /// everything below it, cells included.
    pub fn remove_subtree(&mut self, id: WidgetId) -> Result<(), ViewError> {
        let parent = self.node_ref(id)?.parent;
        match parent {
            Some(parent) => {
                if let Some(parent_node) = self.get_mut(parent) {
                    parent_node.children.retain(|&child| child != id);
                    for row in parent_node.rows.iter_mut() {
                        row.retain(|&cell| cell != id);
                    }
                }
            }
            None => {
                for column in self.columns.iter_mut() {
                    column.retain(|&root| root != id);
                }
            }
        }
        self.evict(id);
        Ok(())
    }

    /// Evict a node's children (and any table rows) while keeping the node
    /// itself — the destroy-before-graft step of a details patch.
    pub fn remove_children(&mut self, id: WidgetId) -> Result<(), ViewError> {
        let node = self.node_mut(id)?;
        let children = std::mem::take(&mut node.children);
        let rows = std::mem::take(&mut node.rows);
        for child in children {
            self.evict(child);
        }
        for row in rows {
            for cell in row {
                self.evict(cell);
            }
        }
        Ok(())
    }

    fn evict(&mut self, id: WidgetId) {
        let Some(node) = self.slots.get_mut(id.0).and_then(|slot| slot.take()) else {
            return;
        };
        if self.index.get(&node.key) == Some(&id) {
            self.index.remove(&node.key);
        }
        for child in node.children {
            self.evict(child);
        }
        for row in node.rows {
            for cell in row {
                self.evict(cell);
            }
        }
    }

    // ── Table row storage ───────────────────────────────────────────

    fn expect_table(&self, table: WidgetId) -> Result<(), ViewError> {
        let node = self.node_ref(table)?;
        match node.control {
            Control::Table { .. } => Ok(()),
            _ => Err(ViewError::NotATable(node.key.to_string())),
        }
    }

    pub fn row_count(&self, table: WidgetId) -> Result<usize, ViewError> {
        self.expect_table(table)?;
        Ok(self.node_ref(table)?.rows.len())
    }

    pub fn rows(&self, table: WidgetId) -> Result<&[Vec<WidgetId>], ViewError> {
        self.expect_table(table)?;
        Ok(&self.node_ref(table)?.rows)
    }

    pub fn push_row(&mut self, table: WidgetId, cells: Vec<WidgetId>) -> Result<usize, ViewError> {
        self.expect_table(table)?;
        let node = self.node_mut(table)?;
        node.rows.push(cells);
        Ok(node.rows.len() - 1)
    }

    /// Evict every cell and forget all rows.
    pub fn clear_rows(&mut self, table: WidgetId) -> Result<(), ViewError> {
        self.expect_table(table)?;
        let rows = std::mem::take(&mut self.node_mut(table)?.rows);
        for row in rows {
            for cell in row {
                self.evict(cell);
            }
        }
        Ok(())
    }

    /// Remove one row and shift every later row down, re-keying its cells —
    /// positional identity means later indices all move.
    pub fn remove_row(&mut self, table: WidgetId, row: usize) -> Result<(), ViewError> {
        self.expect_table(table)?;
        let removed = {
            let node = self.node_mut(table)?;
            if row >= node.rows.len() {
                return Err(ViewError::RowOutOfRange {
                    table: node.key.to_string(),
                    row,
                });
            }
            node.rows.remove(row)
        };
        for cell in removed {
            self.evict(cell);
        }

        let shifted: Vec<Vec<WidgetId>> = self.node_ref(table)?.rows[row..].to_vec();
        for (offset, cells) in shifted.iter().enumerate() {
            let new_row = row + offset;
            for &cell in cells {
                let rekey = self.get_mut(cell).map(|node| {
                    let old = node.key.clone();
                    node.key.row = Some(new_row);
                    (old, node.key.clone())
                });
                if let Some((old, new)) = rekey {
                    if self.index.get(&old) == Some(&cell) {
                        self.index.remove(&old);
                    }
                    self.index.insert(new, cell);
                }
            }
        }
        Ok(())
    }

    /// Presentation-only column visibility: hides the heading and every
    /// cell in that column without touching the index space.
    pub fn set_column_hidden(
        &mut self,
        table: WidgetId,
        column: usize,
        hidden: bool,
    ) -> Result<(), ViewError> {
        self.expect_table(table)?;
        let node = self.node_ref(table)?;
        let mut targets: Vec<WidgetId> = Vec::with_capacity(node.rows.len() + 1);
        if let Some(&head) = node.children.get(column) {
            targets.push(head);
        }
        for row in &node.rows {
            if let Some(&cell) = row.get(column) {
                targets.push(cell);
            }
        }
        for id in targets {
            if let Some(widget) = self.get_mut(id) {
                widget.hidden = hidden;
            }
        }
        Ok(())
    }
}
