//! Variable nodes — the units of the controller's configuration tree.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value::{OptionEntry, Value};

/// Closed set of renderable node kinds.
///
/// The schema is fixed: every node the controller pushes is one of these,
/// and rendering dispatches exhaustively on the tag. Read-only labels are a
/// rendering of a read-only `Select`/input kind, not a kind of their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    Module,
    Table,
    Select,
    Canvas,
    TextArea,
    Url,
    Checkbox,
    Button,
    Range,
    Text,
    Number,
    Password,
    Email,
    #[serde(rename = "tel")]
    Phone,
}

impl VarKind {
    /// Generic single-line input kinds (text / number / password / email /
    /// phone) share one rendering path.
    pub fn is_generic_input(&self) -> bool {
        matches!(
            self,
            VarKind::Text | VarKind::Number | VarKind::Password | VarKind::Email | VarKind::Phone
        )
    }
}

/// Whether a node's cosmetic metadata (label, options, comment) must still
/// be fetched from the controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DynamicState {
    /// Node carries no server-computed metadata.
    #[default]
    NotApplicable,
    /// Resolution has been (or will be) requested; a patch is expected.
    Pending,
    /// A resolution patch has been applied.
    Resolved,
}

impl DynamicState {
    pub fn is_pending(&self) -> bool {
        matches!(self, DynamicState::Pending)
    }

    pub fn is_not_applicable(&self) -> bool {
        matches!(self, DynamicState::NotApplicable)
    }
}

fn dynamic_from_wire<'de, D>(d: D) -> Result<DynamicState, D::Error>
where
    D: Deserializer<'de>,
{
    let pending = bool::deserialize(d)?;
    Ok(if pending {
        DynamicState::Pending
    } else {
        DynamicState::NotApplicable
    })
}

fn dynamic_to_wire<S>(state: &DynamicState, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_bool(state.is_pending())
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One node of the configuration tree.
///
/// `id` is unique within its nesting context; inside a table row the
/// composite key is id + row index. `order` is the sibling sort key (sign
/// ignored). For table columns `value` is a sequence with one entry per
/// row; table `children` define column schemas, never row data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: VarKind,
    #[serde(rename = "o", default)]
    pub order: f64,
    #[serde(rename = "ro", default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(rename = "log", default, skip_serializing_if = "is_false")]
    pub log_scale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<OptionEntry>>,
    #[serde(rename = "n", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Variable>,
    #[serde(
        rename = "dynamic",
        default,
        skip_serializing_if = "DynamicState::is_not_applicable",
        serialize_with = "dynamic_to_wire",
        deserialize_with = "dynamic_from_wire"
    )]
    pub dynamic: DynamicState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// A module node may carry the saved view perspective, restored after
    /// the first render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
}

impl Variable {
    pub fn new(id: impl Into<String>, kind: VarKind) -> Self {
        Self {
            id: id.into(),
            kind,
            order: 0.0,
            read_only: false,
            value: None,
            min: None,
            max: None,
            log_scale: false,
            options: None,
            children: Vec::new(),
            dynamic: DynamicState::default(),
            label: None,
            comment: None,
            view: None,
        }
    }

    pub fn with_order(mut self, order: f64) -> Self {
        self.order = order;
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Variable>) -> Self {
        self.children = children;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn read_only(mut self, ro: bool) -> Self {
        self.read_only = ro;
        self
    }

    /// The label shown next to this node: the resolved label if one has
    /// arrived, otherwise a capitalization of the id.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(l) => init_cap(l),
            None => init_cap(&self.id),
        }
    }

    /// Effective slider/number bounds with the controller's defaults.
    pub fn bounds(&self) -> (f64, f64) {
        (self.min.unwrap_or(0.0), self.max.unwrap_or(255.0))
    }
}

/// Patch payload addressed to one variable: every field independently
/// optional. Application order is fixed (label, comment, options, value) so
/// an index value can resolve against options arriving in the same patch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VarPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<OptionEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Opaque structured blob the widget tree cannot render; stored on the
    /// session for collaborators to pick up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    /// Name of an external resource to hydrate through the side channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl VarPatch {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// True when the patch carries server-computed cosmetics, i.e. it
    /// counts as a dynamic resolution.
    pub fn resolves_dynamic(&self) -> bool {
        self.label.is_some() || self.comment.is_some() || self.options.is_some()
    }
}

/// Capitalize an id for display: non-alphanumerics become spaces, each word
/// starts uppercase. `"serverName"` → `"ServerName"`, `"wifi_ap"` → `"Wifi Ap"`.
pub fn init_cap(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.push(ch);
            }
            at_word_start = false;
        } else {
            out.push(' ');
            at_word_start = true;
        }
    }
    out
}

/// Stable sort of one sibling level by ascending `|order|`.
pub fn sort_siblings(vars: &mut [Variable]) {
    vars.sort_by(|a, b| {
        a.order
            .abs()
            .partial_cmp(&b.order.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Sort every sibling level of a tree, depth first.
pub fn sort_tree(vars: &mut [Variable]) {
    sort_siblings(vars);
    for var in vars {
        sort_tree(&mut var.children);
    }
}
