//! Widget identities and the closed set of rendered controls.

use helio_model::{OptionEntry, Value};

/// Composite widget identity.
///
/// Top-level widgets are addressed by variable id alone; table cells by
/// column id plus row index. Row identity is positional — an insert or
/// delete shifts every later index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WidgetKey {
    pub id: String,
    pub row: Option<usize>,
}

impl WidgetKey {
    pub fn node(id: impl Into<String>) -> Self {
        Self { id: id.into(), row: None }
    }

    pub fn cell(id: impl Into<String>, row: usize) -> Self {
        Self { id: id.into(), row: Some(row) }
    }

    pub fn is_cell(&self) -> bool {
        self.row.is_some()
    }
}

impl std::fmt::Display for WidgetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.row {
            Some(row) => write!(f, "{}#{row}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Generic single-line input flavors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Number,
    Password,
    Email,
    Phone,
}

/// One rendered control. Exactly one variant per node kind and read-only
/// variant; the mapping from model kinds is exhaustive and lives in the
/// renderer.
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    /// Module container with a heading.
    Panel { heading: String },
    /// Table shell; columns are child widgets, cells live in the node's
    /// row storage. Writable tables expose add/remove row controls.
    Table { writable: bool },
    /// One table column heading.
    ColumnHead { text: String },
    /// Writable select.
    Dropdown {
        options: Vec<OptionEntry>,
        selected: Option<Value>,
    },
    /// Read-only rendering of selects and generic inputs.
    StaticText { text: String },
    /// Graphical surface fed by out-of-band binary preview frames.
    Surface { preview: Vec<u8> },
    TextArea { text: String, read_only: bool },
    Link { href: String, text: String },
    Checkbox { checked: bool, enabled: bool },
    Button { caption: String, enabled: bool },
    Slider {
        min: f64,
        max: f64,
        log_scale: bool,
        value: f64,
        /// Paired live readout, refreshed on every value change.
        readout: String,
    },
    Field { input: InputKind, text: String },
}

impl Control {
    /// The text this control currently displays — the row-key comparison
    /// source for content-addressed row matching.
    pub fn display_text(&self) -> String {
        match self {
            Control::Panel { heading } => heading.clone(),
            Control::Table { .. } => String::new(),
            Control::ColumnHead { text } => text.clone(),
            Control::Dropdown { options, selected } => match selected {
                Some(value) => resolve_option_label(options, value)
                    .unwrap_or_else(|| value.display_text()),
                None => String::new(),
            },
            Control::StaticText { text } => text.clone(),
            Control::Surface { .. } => String::new(),
            Control::TextArea { text, .. } => text.clone(),
            Control::Link { text, .. } => text.clone(),
            Control::Checkbox { checked, .. } => checked.to_string(),
            Control::Button { caption, .. } => caption.clone(),
            Control::Slider { value, .. } => Value::Float(*value).display_text(),
            Control::Field { text, .. } => text.clone(),
        }
    }
}

/// Resolve a stored value to its option label, honoring both bare-label
/// (positional) and `[value, label]` entries.
pub fn resolve_option_label(options: &[OptionEntry], value: &Value) -> Option<String> {
    // Explicit pairs match by value first.
    for entry in options {
        if let OptionEntry::Pair(v, label) = entry {
            if v == value {
                return Some(label.clone());
            }
        }
    }
    // Bare labels match by position.
    if let Some(index) = value.as_index() {
        if let Some(OptionEntry::Label(label)) = options.get(index) {
            return Some(label.clone());
        }
    }
    None
}
