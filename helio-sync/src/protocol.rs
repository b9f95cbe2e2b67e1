//! Frame shapes: snapshot vs. keyed updates inbound, single-key commands
//! outbound.
//!
//! The protocol carries no sequence numbers. Frames are processed strictly
//! in arrival order and every patch is self-describing; the only ordering
//! guarantee is that the snapshot (a top-level array) comes first on each
//! connection.

use log::warn;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use helio_model::{Value, VarPatch, Variable};

/// Advisory outbound frame size. Exceeding it only logs — nothing is split
/// or throttled (known gap, kept as-is).
pub const ADVISORY_FRAME_LIMIT: usize = 1340;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("malformed frame: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("frame is neither a snapshot array nor an update object")]
    UnexpectedShape,
}

/// One inbound text frame, decoded.
#[derive(Debug)]
pub enum ServerMessage {
    /// Top-level array: the full tree, sent once per connection.
    Snapshot(Vec<Variable>),
    /// Top-level object: one or more updates, in key order.
    Updates(Vec<Update>),
}

/// One keyed update out of an inbound object.
#[derive(Debug)]
pub enum Update {
    /// Replace the subtree under one node.
    Details { id: String, children: Vec<Variable> },
    /// Rewrite table rows matched by first-column content.
    UpdateRow { table: String, rows: Vec<Vec<Value>> },
    /// Server echo that requires no client action (`dynamicResolve`,
    /// `view`).
    Ack { key: String },
    /// Attribute patch addressed to one variable id.
    Var { id: String, patch: VarPatch },
}

#[derive(Debug, Deserialize)]
struct DetailsPayload {
    id: String,
    #[serde(rename = "n", default)]
    children: Vec<Variable>,
}

impl ServerMessage {
    /// Decode one text frame. Unknown or malformed *keys* inside an update
    /// object are logged and skipped — a bad key never poisons its
    /// siblings and never closes the channel.
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        let frame: serde_json::Value = serde_json::from_str(text)?;
        match frame {
            serde_json::Value::Array(items) => {
                let roots: Vec<Variable> =
                    serde_json::from_value(serde_json::Value::Array(items))?;
                Ok(ServerMessage::Snapshot(roots))
            }
            serde_json::Value::Object(entries) => {
                enum Kind {
                    Details,
                    UpdateRow,
                    Ack,
                    Var,
                }
                let mut updates = Vec::with_capacity(entries.len());
                for (key, payload) in entries {
                    let kind = match key.as_str() {
                        "details" => Kind::Details,
                        "updateRow" => Kind::UpdateRow,
                        "dynamicResolve" | "view" => Kind::Ack,
                        _ => Kind::Var,
                    };
                    match kind {
                        Kind::Details => match serde_json::from_value::<DetailsPayload>(payload) {
                            Ok(details) => updates.push(Update::Details {
                                id: details.id,
                                children: details.children,
                            }),
                            Err(e) => warn!("discarding malformed details payload: {e}"),
                        },
                        Kind::UpdateRow => match payload {
                            serde_json::Value::Object(tables) => {
                                for (table, rows) in tables {
                                    match serde_json::from_value::<Vec<Vec<Value>>>(rows) {
                                        Ok(rows) => updates.push(Update::UpdateRow { table, rows }),
                                        Err(e) => {
                                            warn!("discarding malformed updateRow for {table}: {e}")
                                        }
                                    }
                                }
                            }
                            other => warn!("discarding malformed updateRow payload: {other}"),
                        },
                        Kind::Ack => updates.push(Update::Ack { key }),
                        Kind::Var => match serde_json::from_value::<VarPatch>(payload) {
                            Ok(patch) => updates.push(Update::Var { id: key, patch }),
                            Err(e) => warn!("discarding malformed patch: {e}"),
                        },
                    }
                }
                Ok(ServerMessage::Updates(updates))
            }
            _ => Err(SyncError::UnexpectedShape),
        }
    }
}

/// One outbound command. Every command encodes to a single-key JSON object.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// User edit, sent immediately: `{"<id>": value}`.
    SetValue { id: String, value: Value },
    /// Batched dynamic-resolution request: `{"dynamicResolve":[ids...]}`.
    DynamicResolve(Vec<String>),
    /// Persist the active perspective: `{"view":"..."}`.
    View(String),
    /// Structural table change: `{"insertRow":{"id":..,"row":..}}`.
    InsertRow { id: String, row: usize },
    /// Structural table change: `{"deleteRow":{"id":..,"row":..}}`.
    DeleteRow { id: String, row: usize },
}

impl Command {
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        match self {
            Command::SetValue { id, value } => {
                map.insert(
                    id.clone(),
                    serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                );
            }
            Command::DynamicResolve(ids) => {
                map.insert("dynamicResolve".into(), json!(ids));
            }
            Command::View(view) => {
                map.insert("view".into(), json!(view));
            }
            Command::InsertRow { id, row } => {
                map.insert("insertRow".into(), json!({ "id": id, "row": row }));
            }
            Command::DeleteRow { id, row } => {
                map.insert("deleteRow".into(), json!({ "id": id, "row": row }));
            }
        }
        serde_json::Value::Object(map)
    }

    /// Encode to a text frame, logging when the advisory size is exceeded.
    pub fn encode(&self) -> String {
        let text = self.to_json().to_string();
        if text.len() > ADVISORY_FRAME_LIMIT {
            warn!("outbound frame {} bytes exceeds advisory limit", text.len());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snapshot_array() {
        let raw = r#"[{"id":"Network","type":"module","o":1,"n":[{"id":"ssid","type":"text","o":1,"value":"home"}]}]"#;
        match ServerMessage::parse(raw).unwrap() {
            ServerMessage::Snapshot(roots) => {
                assert_eq!(roots.len(), 1);
                assert_eq!(roots[0].children[0].id, "ssid");
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_var_patch() {
        let raw = r#"{"ssid":{"value":"office"}}"#;
        match ServerMessage::parse(raw).unwrap() {
            ServerMessage::Updates(updates) => {
                assert_eq!(updates.len(), 1);
                match &updates[0] {
                    Update::Var { id, patch } => {
                        assert_eq!(id, "ssid");
                        assert_eq!(patch.value, Some(Value::Text("office".into())));
                    }
                    other => panic!("expected var patch, got {other:?}"),
                }
            }
            other => panic!("expected updates, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_preserves_key_order() {
        let raw = r#"{"zz":{"value":1},"aa":{"value":2}}"#;
        match ServerMessage::parse(raw).unwrap() {
            ServerMessage::Updates(updates) => {
                let ids: Vec<&str> = updates
                    .iter()
                    .map(|u| match u {
                        Update::Var { id, .. } => id.as_str(),
                        _ => "",
                    })
                    .collect();
                assert_eq!(ids, ["zz", "aa"]);
            }
            other => panic!("expected updates, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_details() {
        let raw = r#"{"details":{"id":"fx","n":[{"id":"speed","type":"range","o":1}]}}"#;
        match ServerMessage::parse(raw).unwrap() {
            ServerMessage::Updates(updates) => match &updates[0] {
                Update::Details { id, children } => {
                    assert_eq!(id, "fx");
                    assert_eq!(children[0].id, "speed");
                }
                other => panic!("expected details, got {other:?}"),
            },
            other => panic!("expected updates, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_update_row() {
        let raw = r#"{"updateRow":{"myTable":[["a",1]]}}"#;
        match ServerMessage::parse(raw).unwrap() {
            ServerMessage::Updates(updates) => match &updates[0] {
                Update::UpdateRow { table, rows } => {
                    assert_eq!(table, "myTable");
                    assert_eq!(rows, &vec![vec![Value::Text("a".into()), Value::Int(1)]]);
                }
                other => panic!("expected updateRow, got {other:?}"),
            },
            other => panic!("expected updates, got {other:?}"),
        }
    }

    #[test]
    fn test_server_echo_keys_are_acks() {
        let raw = r#"{"dynamicResolve":["a","b"],"view":"vApp"}"#;
        match ServerMessage::parse(raw).unwrap() {
            ServerMessage::Updates(updates) => {
                assert_eq!(updates.len(), 2);
                assert!(matches!(&updates[0], Update::Ack { key } if key == "dynamicResolve"));
                assert!(matches!(&updates[1], Update::Ack { key } if key == "view"));
            }
            other => panic!("expected updates, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_key_is_skipped_not_fatal() {
        // "details" payload is garbage, but the sibling patch still lands.
        let raw = r#"{"details":42,"bri":{"value":10}}"#;
        match ServerMessage::parse(raw).unwrap() {
            ServerMessage::Updates(updates) => {
                assert_eq!(updates.len(), 1);
                assert!(matches!(&updates[0], Update::Var { id, .. } if id == "bri"));
            }
            other => panic!("expected updates, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frame_is_error() {
        assert!(ServerMessage::parse("not json").is_err());
        assert!(matches!(
            ServerMessage::parse("42"),
            Err(SyncError::UnexpectedShape)
        ));
    }

    #[test]
    fn test_command_encodings() {
        let edit = Command::SetValue {
            id: "ssid".into(),
            value: "office".into(),
        };
        assert_eq!(edit.encode(), r#"{"ssid":"office"}"#);

        let resolve = Command::DynamicResolve(vec!["a".into(), "b".into()]);
        assert_eq!(resolve.encode(), r#"{"dynamicResolve":["a","b"]}"#);

        let view = Command::View("vApp".into());
        assert_eq!(view.encode(), r#"{"view":"vApp"}"#);

        let insert = Command::InsertRow { id: "tbl".into(), row: 3 };
        assert_eq!(insert.encode(), r#"{"insertRow":{"id":"tbl","row":3}}"#);

        let delete = Command::DeleteRow { id: "tbl".into(), row: 0 };
        assert_eq!(delete.encode(), r#"{"deleteRow":{"id":"tbl","row":0}}"#);
    }

    #[test]
    fn test_numeric_edit_encodes_as_number() {
        let edit = Command::SetValue { id: "bri".into(), value: Value::Int(128) };
        assert_eq!(edit.encode(), r#"{"bri":128}"#);
    }

    #[test]
    fn test_oversized_frame_still_encodes() {
        // The size check is advisory: a huge frame encodes fine.
        let ids: Vec<String> = (0..200).map(|i| format!("variable_{i:04}")).collect();
        let cmd = Command::DynamicResolve(ids);
        let frame = cmd.encode();
        assert!(frame.len() > ADVISORY_FRAME_LIMIT);
        // And parses back as JSON.
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert!(parsed.get("dynamicResolve").is_some());
    }
}
