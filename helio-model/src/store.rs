//! The client-side mirror of the controller's variable tree.

use log::debug;

use crate::var::{sort_tree, VarPatch, Variable};

/// Authoritative client mirror of server state.
///
/// Built once per connection from the snapshot, then mutated only by
/// subtree grafts and attribute merges. Lookup is a depth-first pre-order
/// search; trees are small enough that O(n) per call is acceptable — the
/// hot per-patch lookups run against the view tree's index instead.
#[derive(Debug, Default)]
pub struct ModelStore {
    roots: Vec<Variable>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mirror with a fresh snapshot, sorting every sibling
    /// level. Only called on (re)connect.
    pub fn ingest_snapshot(&mut self, mut roots: Vec<Variable>) {
        sort_tree(&mut roots);
        self.roots = roots;
    }

    pub fn roots(&self) -> &[Variable] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Discard the mirror (reconnect path).
    pub fn clear(&mut self) {
        self.roots.clear();
    }

    /// Total node count, all levels.
    pub fn len(&self) -> usize {
        fn count(vars: &[Variable]) -> usize {
            vars.iter().map(|v| 1 + count(&v.children)).sum()
        }
        count(&self.roots)
    }

    /// Depth-first pre-order search from the roots.
    pub fn find(&self, id: &str) -> Option<&Variable> {
        find_in(&self.roots, id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Variable> {
        find_in_mut(&mut self.roots, id)
    }

    /// Replace the subtree under `id` (details patch). Returns false when
    /// the id is unknown; the mirror is left untouched.
    pub fn graft(&mut self, id: &str, mut children: Vec<Variable>) -> bool {
        sort_tree(&mut children);
        match self.find_mut(id) {
            Some(var) => {
                var.children = children;
                true
            }
            None => {
                debug!("graft: id {id:?} not in mirror");
                false
            }
        }
    }

    /// Merge patch attributes onto the mirror node. Never touches
    /// structure. A patch carrying cosmetics marks a pending node resolved.
    pub fn merge_attrs(&mut self, id: &str, patch: &VarPatch) -> bool {
        match self.find_mut(id) {
            Some(var) => {
                if let Some(label) = &patch.label {
                    var.label = Some(label.clone());
                }
                if let Some(comment) = &patch.comment {
                    var.comment = Some(comment.clone());
                }
                if let Some(options) = &patch.options {
                    var.options = Some(options.clone());
                }
                if let Some(value) = &patch.value {
                    var.value = Some(value.clone());
                }
                if patch.resolves_dynamic() && var.dynamic.is_pending() {
                    var.dynamic = crate::var::DynamicState::Resolved;
                }
                true
            }
            None => {
                debug!("merge_attrs: id {id:?} not in mirror");
                false
            }
        }
    }
}

fn find_in<'a>(vars: &'a [Variable], id: &str) -> Option<&'a Variable> {
    for var in vars {
        if var.id == id {
            return Some(var);
        }
        if let Some(hit) = find_in(&var.children, id) {
            return Some(hit);
        }
    }
    None
}

fn find_in_mut<'a>(vars: &'a mut [Variable], id: &str) -> Option<&'a mut Variable> {
    for var in vars.iter_mut() {
        if var.id == id {
            return Some(var);
        }
        if let Some(hit) = find_in_mut(&mut var.children, id) {
            return Some(hit);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::var::{DynamicState, VarKind};

    fn snapshot() -> Vec<Variable> {
        vec![
            Variable::new("Network", VarKind::Module)
                .with_order(2.0)
                .with_children(vec![
                    Variable::new("ssid", VarKind::Text).with_order(1.0).with_value("home"),
                    Variable::new("rssi", VarKind::Number).with_order(2.0).read_only(true),
                ]),
            Variable::new("Leds", VarKind::Module).with_order(1.0).with_children(vec![
                Variable::new("bri", VarKind::Range).with_order(1.0).with_value(128i64),
            ]),
        ]
    }

    #[test]
    fn test_ingest_sorts_all_levels() {
        let mut store = ModelStore::new();
        store.ingest_snapshot(snapshot());
        assert_eq!(store.roots()[0].id, "Leds");
        assert_eq!(store.roots()[1].id, "Network");
        assert_eq!(store.roots()[1].children[0].id, "ssid");
    }

    #[test]
    fn test_find_pre_order() {
        let mut store = ModelStore::new();
        store.ingest_snapshot(snapshot());
        assert!(store.find("bri").is_some());
        assert!(store.find("ssid").is_some());
        assert!(store.find("nope").is_none());
    }

    #[test]
    fn test_find_mut_updates_in_place() {
        let mut store = ModelStore::new();
        store.ingest_snapshot(snapshot());
        store.find_mut("ssid").unwrap().value = Some("office".into());
        assert_eq!(store.find("ssid").unwrap().value, Some(Value::Text("office".into())));
    }

    #[test]
    fn test_graft_replaces_subtree() {
        let mut store = ModelStore::new();
        store.ingest_snapshot(snapshot());
        let ok = store.graft(
            "Leds",
            vec![
                Variable::new("fx", VarKind::Select).with_order(2.0),
                Variable::new("speed", VarKind::Range).with_order(1.0),
            ],
        );
        assert!(ok);
        let leds = store.find("Leds").unwrap();
        assert_eq!(leds.children[0].id, "speed"); // grafted children sorted
        assert!(store.find("bri").is_none()); // old subtree gone
    }

    #[test]
    fn test_graft_unknown_id_is_noop() {
        let mut store = ModelStore::new();
        store.ingest_snapshot(snapshot());
        let before = store.len();
        assert!(!store.graft("ghost", vec![Variable::new("x", VarKind::Text)]));
        assert_eq!(store.len(), before);
    }

    #[test]
    fn test_merge_attrs() {
        let mut store = ModelStore::new();
        let mut var = Variable::new("fx", VarKind::Select);
        var.dynamic = DynamicState::Pending;
        store.ingest_snapshot(vec![var]);

        let patch: VarPatch =
            serde_json::from_str(r#"{"label":"effect","options":["Solid","Rainbow"],"value":1}"#)
                .unwrap();
        assert!(store.merge_attrs("fx", &patch));

        let fx = store.find("fx").unwrap();
        assert_eq!(fx.label.as_deref(), Some("effect"));
        assert_eq!(fx.value, Some(Value::Int(1)));
        assert_eq!(fx.dynamic, DynamicState::Resolved);
    }

    #[test]
    fn test_merge_attrs_unknown_id() {
        let mut store = ModelStore::new();
        store.ingest_snapshot(snapshot());
        assert!(!store.merge_attrs("ghost", &VarPatch::value("x")));
    }

    #[test]
    fn test_clear_discards_mirror() {
        let mut store = ModelStore::new();
        store.ingest_snapshot(snapshot());
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }
}
