//! Snapshot materialization — model tree in, widget tree out.

use helio_model::{Value, VarKind, Variable};

use crate::tree::{ViewNode, ViewTree, WidgetId};
use crate::widget::{resolve_option_label, Control, InputKind, WidgetKey};

/// What a materialization pass produced besides widgets: ids still needing
/// server-side cosmetic resolution, and a saved view perspective if a
/// module carried one.
#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub pending: Vec<String>,
    pub saved_view: Option<String>,
}

/// Maps model nodes to controls. Stateless; the round-robin column cursor
/// lives on the tree.
pub struct Renderer;

impl Renderer {
    /// Materialize the full snapshot — done exactly once per connection.
    /// Siblings are expected pre-sorted (the store sorts on ingest); the
    /// static structure is complete afterwards, and all dynamic content
    /// arrives only through later patches.
    pub fn materialize_snapshot(tree: &mut ViewTree, roots: &[Variable]) -> RenderOutcome {
        let mut outcome = RenderOutcome::default();
        for var in roots {
            let id = Self::materialize_node(tree, var, None, None, &mut outcome);
            tree.place_top_level(id);
        }
        outcome
    }

    /// Materialize a sibling run under one parent. Used for detail grafts
    /// and module bodies.
    pub fn materialize_children(
        tree: &mut ViewTree,
        vars: &[Variable],
        parent: WidgetId,
        row: Option<usize>,
        outcome: &mut RenderOutcome,
    ) {
        for var in vars {
            Self::materialize_node(tree, var, Some(parent), row, outcome);
        }
    }

    /// Materialize one node (and its subtree). With `row` set the node is a
    /// table cell: keyed id+row, no label, and never queued for dynamic
    /// resolution — the column heading resolves for the whole column.
    pub fn materialize_node(
        tree: &mut ViewTree,
        var: &Variable,
        parent: Option<WidgetId>,
        row: Option<usize>,
        outcome: &mut RenderOutcome,
    ) -> WidgetId {
        if let Some(view) = &var.view {
            outcome.saved_view = Some(view.clone());
        }

        let parent_is_table = parent
            .and_then(|p| tree.get(p))
            .map(|node| matches!(node.control, Control::Table { .. }))
            .unwrap_or(false);

        let key = match row {
            Some(r) => WidgetKey::cell(&var.id, r),
            None => WidgetKey::node(&var.id),
        };
        let control = if parent_is_table && row.is_none() {
            // Table children define column schemas; they render as headings
            // and rows arrive exclusively through later patches.
            Control::ColumnHead {
                text: var.display_label(),
            }
        } else {
            Self::control_for(var)
        };
        let label = if row.is_some() { String::new() } else { var.display_label() };
        let mut node = ViewNode::new(key, control, label);
        node.comment = var.comment.clone();

        let id = match (parent_is_table && row.is_some(), parent) {
            (true, Some(table)) => tree.insert_cell(table, node),
            _ => tree.insert(parent, node),
        };

        if row.is_none() && var.dynamic.is_pending() {
            outcome.pending.push(var.id.clone());
        }

        if !var.children.is_empty() {
            Self::materialize_children(tree, &var.children, id, row, outcome);
        }
        id
    }

    /// The closed kind→control mapping (read-only variants included).
    pub fn control_for(var: &Variable) -> Control {
        match var.kind {
            VarKind::Module => Control::Panel {
                heading: var.display_label(),
            },
            VarKind::Table => Control::Table {
                writable: !var.read_only,
            },
            VarKind::Select => {
                if var.read_only {
                    Control::StaticText {
                        text: select_text(var),
                    }
                } else {
                    Control::Dropdown {
                        options: var.options.clone().unwrap_or_default(),
                        selected: var.value.clone(),
                    }
                }
            }
            VarKind::Canvas => Control::Surface { preview: Vec::new() },
            VarKind::TextArea => Control::TextArea {
                text: value_text(var),
                read_only: var.read_only,
            },
            VarKind::Url => {
                let href = value_text(var);
                Control::Link {
                    text: href.clone(),
                    href,
                }
            }
            VarKind::Checkbox => Control::Checkbox {
                checked: var.value.as_ref().map(Value::is_truthy).unwrap_or(false),
                enabled: !var.read_only,
            },
            VarKind::Button => Control::Button {
                caption: var.display_label(),
                enabled: !var.read_only,
            },
            VarKind::Range => {
                let (min, max) = var.bounds();
                let value = var.value.as_ref().and_then(Value::as_f64).unwrap_or(0.0);
                Control::Slider {
                    min,
                    max,
                    log_scale: var.log_scale,
                    value,
                    readout: slider_readout(min, max, var.log_scale, value),
                }
            }
            VarKind::Text | VarKind::Number | VarKind::Password | VarKind::Email | VarKind::Phone => {
                if var.read_only {
                    Control::StaticText {
                        text: value_text(var),
                    }
                } else {
                    Control::Field {
                        input: input_kind(var.kind),
                        text: value_text(var),
                    }
                }
            }
        }
    }

    /// Column default used when rows are instantiated lazily or inserted
    /// optimistically.
    pub fn default_cell_value(column: &Variable) -> Value {
        match column.kind {
            VarKind::Checkbox => Value::Bool(false),
            VarKind::Number | VarKind::Range => Value::Float(column.min.unwrap_or(0.0)),
            VarKind::Select => Value::Int(0),
            _ => Value::Text(String::new()),
        }
    }
}

fn value_text(var: &Variable) -> String {
    var.value.as_ref().map(Value::display_text).unwrap_or_default()
}

fn select_text(var: &Variable) -> String {
    match (&var.options, &var.value) {
        (Some(options), Some(value)) => {
            resolve_option_label(options, value).unwrap_or_else(|| value.display_text())
        }
        _ => value_text(var),
    }
}

fn input_kind(kind: VarKind) -> InputKind {
    match kind {
        VarKind::Number => InputKind::Number,
        VarKind::Password => InputKind::Password,
        VarKind::Email => InputKind::Email,
        VarKind::Phone => InputKind::Phone,
        _ => InputKind::Text,
    }
}

/// Map a linear slider position into its logarithmic readout.
///
/// `value == 0` short-circuits to 0 so the logarithm is never evaluated on
/// an empty domain. With `min <= 0` the lower anchor is `ln⁻¹(0) = 1`.
pub fn linear_to_logarithm(min: f64, max: f64, value: f64) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    let minv = if min > 0.0 { min.ln() } else { 0.0 };
    let maxv = max.ln();
    let scale = (maxv - minv) / (max - min);
    (minv + scale * (value - min)).exp().round()
}

/// The text a slider's paired readout shows for a given position.
pub fn slider_readout(min: f64, max: f64, log_scale: bool, value: f64) -> String {
    let shown = if log_scale {
        linear_to_logarithm(min, max, value)
    } else {
        value
    };
    Value::Float(shown).display_text()
}
