//! Scalar and sequence values carried by variables and patches.

use serde::{Deserialize, Serialize};

/// A variable value as it appears on the wire.
///
/// Scalars cover every editable control; `List` appears on table nodes
/// (one entry per row, each itself a list of cell values) and on table
/// columns (one entry per row).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    /// Numeric view, for bounds math and slider readouts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Non-negative integer view, for option-index resolution.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Value::Int(i) if *i >= 0 => Some(*i as usize),
            Value::Float(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as usize),
            _ => None,
        }
    }

    /// Checkbox semantics: anything non-empty / non-zero is on.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
        }
    }

    /// The text a cell or read-only span displays for this value.
    ///
    /// `Null` renders empty (the row-reconciliation marker); whole floats
    /// drop the trailing `.0` so `3.0` and `3` display identically.
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) => s.clone(),
            Value::List(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// One dropdown option.
///
/// Either a bare label (its value is its position in the list) or an
/// explicit `[value, label]` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionEntry {
    Label(String),
    Pair(Value, String),
}

impl OptionEntry {
    pub fn label(&self) -> &str {
        match self {
            OptionEntry::Label(l) => l,
            OptionEntry::Pair(_, l) => l,
        }
    }

    /// The value this option submits, given its position in the list.
    pub fn value_at(&self, index: usize) -> Value {
        match self {
            OptionEntry::Label(_) => Value::Int(index as i64),
            OptionEntry::Pair(v, _) => v.clone(),
        }
    }
}
