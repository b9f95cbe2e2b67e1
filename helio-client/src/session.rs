//! The session — one owner of the full mirror→view pipeline.
//!
//! All mutation happens inside event handlers, one event fully processed
//! before the next; the session is single-threaded and never reentrant.
//! Outbound traffic goes through a [`CommandSink`] so the engine can run
//! against a live connection or a recording sink in tests.

use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use helio_model::{ModelStore, Value, VarPatch, Variable};
use helio_sync::{BlobFetcher, ChannelEvent, Command, Connection, NullFetcher, ServerMessage};
use helio_view::{Control, Renderer, ViewTree};

use crate::queue::ResolveQueue;

/// Where outbound commands go.
pub trait CommandSink {
    fn send(&mut self, command: Command);
}

/// The live connection is a sink.
impl CommandSink for Connection {
    fn send(&mut self, command: Command) {
        Connection::send(self, &command);
    }
}

/// Test sink: keeps every command for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: Vec<Command>,
}

impl CommandSink for RecordingSink {
    fn send(&mut self, command: Command) {
        self.sent.push(command);
    }
}

/// One synchronization session: the model mirror, the materialized view,
/// the resolve queue and the outbound sink, advanced by channel events.
pub struct Session<S: CommandSink> {
    pub(crate) store: ModelStore,
    pub(crate) view: ViewTree,
    pub(crate) queue: ResolveQueue,
    pub(crate) sink: S,
    pub(crate) fetcher: Box<dyn BlobFetcher>,
    /// Set once the snapshot has been materialized; updates arriving
    /// earlier are unreachable and dropped.
    pub(crate) rendered: bool,
    /// Mirror of the channel gate: open handshake done, sends legal.
    ready: bool,
    /// Target id announced for the next out-of-band binary frame.
    pub(crate) pending_preview: Option<String>,
    /// Structured blobs the view cannot render, keyed by variable id.
    pub(crate) json_blobs: FxHashMap<String, serde_json::Value>,
    active_view: Option<String>,
}

impl<S: CommandSink> Session<S> {
    pub fn new(sink: S) -> Self {
        Self::with_fetcher(sink, Box::new(NullFetcher))
    }

    pub fn with_fetcher(sink: S, fetcher: Box<dyn BlobFetcher>) -> Self {
        Self {
            store: ModelStore::new(),
            view: ViewTree::new(),
            queue: ResolveQueue::new(),
            sink,
            fetcher,
            rendered: false,
            ready: false,
            pending_preview: None,
            json_blobs: FxHashMap::default(),
            active_view: None,
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn view(&self) -> &ViewTree {
        &self.view
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn active_view(&self) -> Option<&str> {
        self.active_view.as_deref()
    }

    pub fn json_blob(&self, id: &str) -> Option<&serde_json::Value> {
        self.json_blobs.get(id)
    }

    // ── Channel events ──────────────────────────────────────────────

    /// Advance the session by one channel event.
    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                self.ready = true;
            }
            ChannelEvent::Text(text) => self.apply_text(&text),
            ChannelEvent::Binary(data) => self.apply_binary(data),
            ChannelEvent::Closed => {
                // The mirror restarts from the next snapshot; anything
                // arriving before it is unreachable by construction.
                self.ready = false;
                self.reset();
            }
        }
    }

    fn reset(&mut self) {
        self.store.clear();
        self.view.clear();
        self.queue.clear();
        self.rendered = false;
        self.pending_preview = None;
    }

    /// Apply one inbound text frame: the snapshot array exactly once per
    /// connection, keyed update objects afterwards. Malformed frames are
    /// logged and discarded; the channel stays open.
    pub fn apply_text(&mut self, text: &str) {
        match ServerMessage::parse(text) {
            Ok(ServerMessage::Snapshot(roots)) => self.apply_snapshot(roots),
            Ok(ServerMessage::Updates(updates)) => {
                if !self.rendered {
                    debug!("update before snapshot, ignoring");
                    return;
                }
                for update in updates {
                    self.apply_update(update);
                }
            }
            Err(e) => warn!("discarding inbound frame: {e}"),
        }
    }

    fn apply_snapshot(&mut self, roots: Vec<Variable>) {
        if self.rendered {
            warn!("snapshot while tree already materialized, ignoring");
            return;
        }
        self.store.ingest_snapshot(roots);
        let outcome = Renderer::materialize_snapshot(&mut self.view, self.store.roots());
        self.rendered = true;
        info!(
            "snapshot materialized: {} variables, {} widgets",
            self.store.len(),
            self.view.node_count()
        );

        for id in outcome.pending {
            self.queue.push(id, &mut self.sink);
        }
        // Always drain the remainder right after the full-tree render.
        self.queue.flush(&mut self.sink);

        if let Some(view) = outcome.saved_view {
            self.active_view = Some(view);
        }
    }

    /// Route one out-of-band binary frame to the announced preview target.
    fn apply_binary(&mut self, data: Vec<u8>) {
        let Some(target) = self.pending_preview.take() else {
            debug!("unannounced binary frame ({} bytes), dropping", data.len());
            return;
        };
        let Some(widget) = self.view.node(&target) else {
            warn!("preview target {target} has no materialized node");
            return;
        };
        match self.view.get_mut(widget) {
            Some(node) => match &mut node.control {
                Control::Surface { preview } => *preview = data,
                _ => warn!("preview target {target} is not a surface"),
            },
            None => warn!("preview target {target} vanished"),
        }
    }

    // ── User interaction ────────────────────────────────────────────

    /// Apply a user edit locally and send it immediately — edits bypass
    /// the resolve queue to keep interactive latency low.
    pub fn edit(&mut self, id: &str, value: Value) {
        self.store.merge_attrs(id, &VarPatch::value(value.clone()));
        if let Some(widget) = self.view.node(id) {
            self.set_widget_value(widget, &value);
        }
        self.sink.send(Command::SetValue {
            id: id.to_string(),
            value,
        });
    }

    /// Edit one table cell; the outbound id carries the row suffix.
    pub fn edit_cell(&mut self, id: &str, row: usize, value: Value) {
        if let Some(widget) = self.view.cell(id, row) {
            self.set_widget_value(widget, &value);
        }
        self.sink.send(Command::SetValue {
            id: format!("{id}#{row}"),
            value,
        });
    }

    /// Flip a checkbox and report the new state.
    pub fn toggle(&mut self, id: &str) {
        let next = match self.view.node(id).and_then(|w| self.view.get(w)) {
            Some(node) => match node.control {
                Control::Checkbox { checked, enabled } => {
                    if !enabled {
                        return;
                    }
                    !checked
                }
                _ => {
                    warn!("toggle on non-checkbox {id}");
                    return;
                }
            },
            None => {
                warn!("toggle on unknown id {id}");
                return;
            }
        };
        self.edit(id, Value::Bool(next));
    }

    /// Fire a button.
    pub fn press(&mut self, id: &str) {
        self.sink.send(Command::SetValue {
            id: id.to_string(),
            value: Value::Bool(true),
        });
    }

    /// Switch the active perspective and persist it server-side.
    pub fn select_view(&mut self, view: &str) {
        self.active_view = Some(view.to_string());
        self.sink.send(Command::View(view.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"[
        {"id":"Network","type":"module","o":1,"n":[
            {"id":"ssid","type":"text","o":1,"value":"home"}
        ]}
    ]"#;

    fn session() -> Session<RecordingSink> {
        Session::new(RecordingSink::default())
    }

    #[test]
    fn test_snapshot_renders_once() {
        let mut s = session();
        s.handle_event(ChannelEvent::Opened);
        s.apply_text(SNAPSHOT);
        assert!(s.is_rendered());
        assert!(s.view().node("ssid").is_some());

        // A second array is a logged no-op.
        let widgets = s.view().node_count();
        s.apply_text(r#"[{"id":"Other","type":"module"}]"#);
        assert_eq!(s.view().node_count(), widgets);
        assert!(s.view().node("Other").is_none());
    }

    #[test]
    fn test_update_before_snapshot_ignored() {
        let mut s = session();
        s.handle_event(ChannelEvent::Opened);
        s.apply_text(r#"{"ssid":{"value":"office"}}"#);
        assert!(!s.is_rendered());
        assert!(s.store().is_empty());
    }

    #[test]
    fn test_close_discards_mirror() {
        let mut s = session();
        s.handle_event(ChannelEvent::Opened);
        s.apply_text(SNAPSHOT);
        assert!(s.is_rendered());

        s.handle_event(ChannelEvent::Closed);
        assert!(!s.is_rendered());
        assert!(!s.is_ready());
        assert!(s.store().is_empty());
        assert!(s.view().is_empty());

        // Patches between close and the next snapshot are unreachable.
        s.apply_text(r#"{"ssid":{"value":"office"}}"#);
        assert!(s.store().is_empty());
    }

    #[test]
    fn test_malformed_frame_keeps_session_alive() {
        let mut s = session();
        s.handle_event(ChannelEvent::Opened);
        s.apply_text("not json at all");
        s.apply_text(SNAPSHOT);
        assert!(s.is_rendered());
    }

    #[test]
    fn test_edit_updates_both_sides_and_sends() {
        let mut s = session();
        s.handle_event(ChannelEvent::Opened);
        s.apply_text(SNAPSHOT);
        s.edit("ssid", "office".into());

        assert_eq!(
            s.store().find("ssid").unwrap().value,
            Some(Value::Text("office".into()))
        );
        let widget = s.view().node("ssid").unwrap();
        assert_eq!(s.view().get(widget).unwrap().control.display_text(), "office");
        assert_eq!(
            s.sink().sent,
            vec![Command::SetValue { id: "ssid".into(), value: "office".into() }]
        );
    }

    #[test]
    fn test_select_view_persists() {
        let mut s = session();
        s.select_view("vSys");
        assert_eq!(s.active_view(), Some("vSys"));
        assert_eq!(s.sink().sent, vec![Command::View("vSys".into())]);
    }

    #[test]
    fn test_binary_without_announcement_dropped() {
        let mut s = session();
        s.handle_event(ChannelEvent::Opened);
        s.apply_text(SNAPSHOT);
        // No pending target: nothing to route to, nothing panics.
        s.handle_event(ChannelEvent::Binary(vec![1, 2, 3]));
        assert!(s.pending_preview.is_none());
    }

    #[test]
    fn test_preview_routing() {
        let mut s = session();
        s.handle_event(ChannelEvent::Opened);
        s.apply_text(
            r#"[{"id":"Leds","type":"module","o":1,"n":[{"id":"preview","type":"canvas","o":1}]}]"#,
        );
        // A value patch on the canvas announces the next binary frame.
        s.apply_text(r#"{"preview":{"value":1}}"#);
        assert_eq!(s.pending_preview.as_deref(), Some("preview"));

        s.handle_event(ChannelEvent::Binary(vec![9, 9, 9]));
        let widget = s.view().node("preview").unwrap();
        match &s.view().get(widget).unwrap().control {
            Control::Surface { preview } => assert_eq!(preview, &vec![9, 9, 9]),
            other => panic!("expected surface, got {other:?}"),
        }
        assert!(s.pending_preview.is_none());
    }
}
