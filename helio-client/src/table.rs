//! The table reconciler: row identity, bulk replacement, content-addressed
//! row rewrites, and the optimistic-insert / deferred-delete pair.
//!
//! Row identity is positional. Row *content* identity, used only by
//! `updateRow` matching, is the first column's displayed value — which the
//! server must keep unique for matching to be meaningful.

use log::{debug, warn};

use helio_model::{Value, Variable};
use helio_sync::Command;
use helio_view::{RenderOutcome, Renderer, WidgetId};

use crate::session::{CommandSink, Session};

impl<S: CommandSink> Session<S> {
    fn cell_in(&self, table: WidgetId, row: usize, column: usize) -> Option<WidgetId> {
        self.view
            .rows(table)
            .ok()
            .and_then(|rows| rows.get(row))
            .and_then(|cells| cells.get(column))
            .copied()
    }

    fn column_schema(&self, table: WidgetId) -> Option<(String, Vec<Variable>)> {
        let table_id = self.view.get(table)?.key.id.clone();
        let columns = self.store.find(&table_id)?.children.clone();
        Some((table_id, columns))
    }

    /// Materialize one row of cells from the column schema, seeded with
    /// column defaults. Cells are keyed column-id + row and never queue
    /// dynamic resolution.
    pub(crate) fn materialize_row(
        &mut self,
        table: WidgetId,
        columns: &[Variable],
        row: usize,
    ) -> Vec<WidgetId> {
        let mut outcome = RenderOutcome::default();
        let mut cells = Vec::with_capacity(columns.len());
        for column in columns {
            // The column's own value is the whole per-row sequence; the
            // cell starts from the column default instead.
            let mut template = column.clone();
            template.value = None;
            let cell =
                Renderer::materialize_node(&mut self.view, &template, Some(table), Some(row), &mut outcome);
            cells.push(cell);
        }
        for (column, &cell) in columns.iter().zip(&cells) {
            let seed = Renderer::default_cell_value(column);
            self.set_widget_value(cell, &seed);
        }
        if let Err(e) = self.view.push_row(table, cells.clone()) {
            warn!("row materialization: {e}");
        }
        cells
    }

    /// Full row replacement: discard every row, regenerate from the
    /// sequence, and give each new cell its value through the normal
    /// value-patch path. Deterministic — identical input reproduces an
    /// identical row set.
    pub(crate) fn rebuild_rows(&mut self, table: WidgetId, rows: &[Value]) {
        let Some((table_id, columns)) = self.column_schema(table) else {
            warn!("row rebuild without a column schema, skipping");
            return;
        };
        if let Err(e) = self.view.clear_rows(table) {
            warn!("row rebuild on {table_id}: {e}");
            return;
        }

        for (row_nr, row) in rows.iter().enumerate() {
            let cells = self.materialize_row(table, &columns, row_nr);
            match row.as_list() {
                Some(cell_values) => {
                    for (column, value) in cell_values.iter().enumerate() {
                        if let Some(&cell) = cells.get(column) {
                            self.set_widget_value(cell, value);
                        }
                    }
                }
                None => warn!("table {table_id} row {row_nr} is not a sequence, left at defaults"),
            }
        }
        // Remainder flush after a row regeneration.
        self.queue.flush(&mut self.sink);
    }

    /// Content-addressed row rewrite: match on the first column's
    /// displayed value, which the server must keep unique. Under duplicate
    /// keys the first matching row wins and later occurrences are left
    /// alone. No match is a logged no-op; this path never creates rows.
    pub(crate) fn apply_update_row(&mut self, table_id: &str, rows: &[Vec<Value>]) {
        let Some(table) = self.view.node(table_id) else {
            warn!("updateRow for table {table_id} with no materialized node, skipping");
            return;
        };
        for payload in rows {
            let Some(key) = payload.first() else {
                debug!("empty updateRow payload for {table_id}");
                continue;
            };
            let key_text = key.display_text();

            let row_count = self.view.rows(table).map(|rows| rows.len()).unwrap_or(0);
            let mut matched = None;
            for row in 0..row_count {
                let Some(cell) = self.cell_in(table, row, 0) else {
                    continue;
                };
                let shown = self
                    .view
                    .get(cell)
                    .map(|node| node.control.display_text())
                    .unwrap_or_default();
                if shown == key_text {
                    matched = Some(row);
                    break;
                }
            }

            match matched {
                Some(row) => {
                    for (column, value) in payload.iter().enumerate() {
                        if let Some(cell) = self.cell_in(table, row, column) {
                            self.set_widget_value(cell, value);
                        }
                    }
                }
                None => {
                    warn!("updateRow: no row in {table_id} keyed {key_text:?}, skipping");
                }
            }
        }
    }

    /// Column-sequence reconciliation: rows inside the sequence update,
    /// rows past its end get a null marker, and a sequence longer than the
    /// table lazily instantiates the missing rows with column defaults
    /// before assignment.
    pub(crate) fn reconcile_column(&mut self, table: WidgetId, column: usize, values: &[Value]) {
        let current = self.view.rows(table).map(|rows| rows.len()).unwrap_or(0);

        let shared = current.min(values.len());
        for row in 0..shared {
            if let Some(cell) = self.cell_in(table, row, column) {
                self.set_widget_value(cell, &values[row]);
            }
        }
        for row in values.len()..current {
            if let Some(cell) = self.cell_in(table, row, column) {
                self.set_widget_value(cell, &Value::Null);
            }
        }

        if values.len() > current {
            let Some((_, columns)) = self.column_schema(table) else {
                warn!("column reconciliation without a schema, rows not instantiated");
                return;
            };
            for row in current..values.len() {
                let cells = self.materialize_row(table, &columns, row);
                if let Some(&cell) = cells.get(column) {
                    self.set_widget_value(cell, &values[row]);
                }
            }
            self.queue.flush(&mut self.sink);
        }
    }

    // ── User-initiated structure changes ────────────────────────────

    /// Optimistic insert: the row appears locally at the next sequential
    /// index with column defaults, and the server is told right away.
    /// Corrections arrive as ordinary patches.
    pub fn insert_row(&mut self, table_id: &str) {
        let Some(table) = self.view.node(table_id) else {
            warn!("insert_row on unknown table {table_id}");
            return;
        };
        match self.view.get(table).map(|node| &node.control) {
            Some(helio_view::Control::Table { writable: true }) => {}
            Some(helio_view::Control::Table { writable: false }) => {
                warn!("insert_row on read-only table {table_id}");
                return;
            }
            _ => {
                warn!("insert_row target {table_id} is not a table");
                return;
            }
        }
        let Some((_, columns)) = self.column_schema(table) else {
            warn!("insert_row on {table_id} without a column schema");
            return;
        };
        let row = self.view.rows(table).map(|rows| rows.len()).unwrap_or(0);
        self.materialize_row(table, &columns, row);
        self.sink.send(Command::InsertRow {
            id: table_id.to_string(),
            row,
        });
    }

    /// Deferred delete: only the command goes out; the row stays until
    /// the server confirms through corrective patches. Removing it
    /// optimistically would race an in-flight insert over the same,
    /// index-shifted row space.
    pub fn delete_row(&mut self, table_id: &str, row: usize) {
        if self.view.node(table_id).is_none() {
            warn!("delete_row on unknown table {table_id}");
            return;
        }
        self.sink.send(Command::DeleteRow {
            id: table_id.to_string(),
            row,
        });
    }

    /// Presentation-only column visibility.
    pub fn set_column_hidden(&mut self, table_id: &str, column: usize, hidden: bool) {
        let Some(table) = self.view.node(table_id) else {
            warn!("column visibility on unknown table {table_id}");
            return;
        };
        if let Err(e) = self.view.set_column_hidden(table, column, hidden) {
            warn!("column visibility on {table_id}: {e}");
        }
    }
}
