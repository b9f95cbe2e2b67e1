//! The patch applier: keyed partial updates in, mirror + view mutations
//! out.
//!
//! Attribute patches apply in a fixed order — label, comment, options,
//! value — because a value may be an index into options for read-only
//! display. Every failure path here degrades to a logged no-op that
//! preserves prior state; nothing closes the channel.

use log::{debug, warn};

use helio_model::{init_cap, OptionEntry, Value, VarPatch, Variable};
use helio_sync::Update;
use helio_view::{resolve_option_label, slider_readout, Control, RenderOutcome, Renderer, WidgetId};

use crate::session::{CommandSink, Session};

impl<S: CommandSink> Session<S> {
    /// Dispatch one keyed update.
    pub(crate) fn apply_update(&mut self, update: Update) {
        match update {
            Update::Ack { key } => debug!("server echo {key}, no action"),
            Update::Details { id, children } => self.apply_details(&id, children),
            Update::UpdateRow { table, rows } => self.apply_update_row(&table, &rows),
            Update::Var { id, patch } => self.apply_var_patch(&id, patch),
        }
    }

    /// Replace the subtree under one node: the materialized subtree is
    /// destroyed before the new one is grafted, so a repeated details
    /// patch can never leave duplicate or orphaned widgets.
    fn apply_details(&mut self, id: &str, children: Vec<Variable>) {
        let Some(widget) = self.view.node(id) else {
            warn!("details for id {id} with no materialized node, skipping");
            return;
        };
        if let Err(e) = self.view.remove_children(widget) {
            warn!("details graft on {id}: {e}");
            return;
        }
        if !self.store.graft(id, children) {
            warn!("details for id {id} not in mirror, view subtree dropped");
            return;
        }

        let mut outcome = RenderOutcome::default();
        if let Some(var) = self.store.find(id) {
            Renderer::materialize_children(&mut self.view, &var.children, widget, None, &mut outcome);
        }
        for pending in outcome.pending {
            self.queue.push(pending, &mut self.sink);
        }
        // Newly grafted nodes resolve right away.
        self.queue.flush(&mut self.sink);
    }

    /// Generic attribute patch addressed to one variable id.
    fn apply_var_patch(&mut self, id: &str, patch: VarPatch) {
        let Some(widget) = self.view.node(id) else {
            warn!("patch for id {id} with no materialized node, skipping");
            return;
        };
        self.store.merge_attrs(id, &patch);

        if let Some(label) = &patch.label {
            self.set_widget_label(widget, label);
        }
        if let Some(comment) = &patch.comment {
            self.set_widget_comment(widget, comment);
        }
        let mut suppress_value = false;
        if let Some(options) = &patch.options {
            suppress_value = self.set_widget_options(widget, options);
        }
        if let Some(value) = &patch.value {
            if suppress_value {
                debug!("value on {id} already satisfied by option resolution");
            } else {
                self.apply_value(widget, value);
            }
        }
        if let Some(json) = patch.json {
            self.json_blobs.insert(id.to_string(), json);
        }
        if let Some(file) = &patch.file {
            self.hydrate(id, file);
        }
    }

    fn set_widget_label(&mut self, widget: WidgetId, label: &str) {
        if let Some(node) = self.view.get_mut(widget) {
            match &mut node.control {
                Control::Button { caption, .. } => *caption = init_cap(label),
                Control::ColumnHead { text } => *text = init_cap(label),
                Control::Panel { heading } => {
                    *heading = init_cap(label);
                    node.label = init_cap(label);
                }
                _ => node.label = init_cap(label),
            }
        }
    }

    fn set_widget_comment(&mut self, widget: WidgetId, comment: &str) {
        if let Some(node) = self.view.get_mut(widget) {
            node.comment = Some(comment.to_string());
        }
    }

    /// Replace a widget's options. Returns true when the patch already
    /// satisfied the displayed value (read-only select whose current text
    /// was an option index), so a value in the same patch must not
    /// overwrite the resolved text.
    fn set_widget_options(&mut self, widget: WidgetId, options: &[OptionEntry]) -> bool {
        enum Applied {
            Static(bool),
            Head,
            Other,
        }
        let applied = match self.view.get_mut(widget) {
            Some(node) => match &mut node.control {
                Control::StaticText { text } => {
                    let mut overruled = false;
                    if let Ok(index) = text.trim().parse::<usize>() {
                        if let Some(entry) = options.get(index) {
                            *text = entry.label().to_string();
                            overruled = true;
                        }
                    }
                    Applied::Static(overruled)
                }
                Control::Dropdown { options: current, .. } => {
                    *current = options.to_vec();
                    Applied::Other
                }
                Control::ColumnHead { .. } => Applied::Head,
                _ => {
                    debug!("options on widget {} without options, ignoring", node.key);
                    Applied::Other
                }
            },
            None => Applied::Other,
        };
        match applied {
            Applied::Static(overruled) => overruled,
            Applied::Head => {
                // Column options propagate to every cell in the column.
                self.propagate_column_options(widget, options);
                false
            }
            Applied::Other => false,
        }
    }

    fn propagate_column_options(&mut self, head: WidgetId, options: &[OptionEntry]) {
        let Some((table, column)) = self.column_position(head) else {
            return;
        };
        let cells: Vec<WidgetId> = match self.view.rows(table) {
            Ok(rows) => rows.iter().filter_map(|row| row.get(column).copied()).collect(),
            Err(e) => {
                warn!("column option propagation: {e}");
                return;
            }
        };
        for cell in cells {
            if let Some(node) = self.view.get_mut(cell) {
                match &mut node.control {
                    Control::Dropdown { options: current, .. } => *current = options.to_vec(),
                    Control::StaticText { text } => {
                        if let Ok(index) = text.trim().parse::<usize>() {
                            if let Some(entry) = options.get(index) {
                                *text = entry.label().to_string();
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Table widget and column index for a column heading.
    pub(crate) fn column_position(&self, head: WidgetId) -> Option<(WidgetId, usize)> {
        let node = self.view.get(head)?;
        let table = node.parent?;
        let parent = self.view.get(table)?;
        if !matches!(parent.control, Control::Table { .. }) {
            return None;
        }
        let column = parent.children.iter().position(|&child| child == head)?;
        Some((table, column))
    }

    /// Value dispatch: tables take full row replacement, column headings
    /// fan out across rows, everything else is a scalar assignment.
    fn apply_value(&mut self, widget: WidgetId, value: &Value) {
        enum Target {
            Table,
            Column,
            Scalar,
        }
        let target = match self.view.get(widget) {
            Some(node) => match node.control {
                Control::Table { .. } => Target::Table,
                Control::ColumnHead { .. } => Target::Column,
                _ => Target::Scalar,
            },
            None => return,
        };
        match target {
            Target::Table => match value.as_list() {
                Some(rows) => self.rebuild_rows(widget, rows),
                None => warn!("table value patch is not a sequence, ignoring"),
            },
            Target::Column => self.apply_column_value(widget, value),
            Target::Scalar => self.set_widget_value(widget, value),
        }
    }

    /// Column patch: one scalar applies uniformly to every row; a sequence
    /// reconciles per row (handled by the table reconciler).
    fn apply_column_value(&mut self, head: WidgetId, value: &Value) {
        let Some((table, column)) = self.column_position(head) else {
            return;
        };
        match value {
            Value::List(per_row) => self.reconcile_column(table, column, per_row),
            scalar => {
                let cells: Vec<WidgetId> = match self.view.rows(table) {
                    Ok(rows) => rows.iter().filter_map(|row| row.get(column).copied()).collect(),
                    Err(e) => {
                        warn!("column value: {e}");
                        return;
                    }
                };
                for cell in cells {
                    self.set_widget_value(cell, scalar);
                }
            }
        }
    }

    /// Scalar assignment onto one widget, per control kind. Read-only
    /// selects resolve a numeric value through the mirror's options when
    /// available, otherwise display verbatim. A canvas value announces the
    /// target of the next out-of-band binary frame.
    pub(crate) fn set_widget_value(&mut self, widget: WidgetId, value: &Value) {
        let resolved = {
            let Some(node) = self.view.get(widget) else {
                return;
            };
            match &node.control {
                Control::StaticText { .. } => self
                    .store
                    .find(&node.key.id)
                    .and_then(|var| var.options.as_deref())
                    .and_then(|options| resolve_option_label(options, value)),
                _ => None,
            }
        };

        let mut announce: Option<String> = None;
        if let Some(node) = self.view.get_mut(widget) {
            match &mut node.control {
                Control::StaticText { text } => {
                    *text = resolved.unwrap_or_else(|| value.display_text());
                }
                Control::Link { href, text } => {
                    *href = value.display_text();
                    *text = value.display_text();
                }
                Control::Surface { .. } => announce = Some(node.key.id.clone()),
                Control::Checkbox { checked, .. } => *checked = value.is_truthy(),
                Control::Button { caption, .. } => {
                    if value.is_truthy() {
                        *caption = value.display_text();
                    }
                }
                Control::Slider { min, max, log_scale, value: current, readout } => {
                    if let Some(position) = value.as_f64() {
                        *current = position;
                        // The paired readout refreshes synchronously with
                        // every value change.
                        *readout = slider_readout(*min, *max, *log_scale, position);
                    }
                }
                Control::Dropdown { selected, .. } => *selected = Some(value.clone()),
                Control::TextArea { text, .. } => *text = value.display_text(),
                Control::Field { text, .. } => *text = value.display_text(),
                Control::Panel { .. } | Control::Table { .. } | Control::ColumnHead { .. } => {
                    debug!("scalar value on structural widget {}, ignoring", node.key);
                }
            }
        }
        if let Some(id) = announce {
            self.pending_preview = Some(id);
        }
    }

    /// Hydrate a large structured field through the side channel.
    fn hydrate(&mut self, id: &str, name: &str) {
        match self.fetcher.fetch(name) {
            Ok(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(blob) => {
                    self.json_blobs.insert(id.to_string(), blob);
                }
                Err(e) => warn!("hydrated resource {name} is not valid JSON: {e}"),
            },
            Err(e) => warn!("side-channel fetch of {name} failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RecordingSink;
    use helio_sync::{ChannelEvent, Command};

    fn session_with(snapshot: &str) -> Session<RecordingSink> {
        let mut s = Session::new(RecordingSink::default());
        s.handle_event(ChannelEvent::Opened);
        s.apply_text(snapshot);
        assert!(s.is_rendered());
        s
    }

    fn display(s: &Session<RecordingSink>, id: &str) -> String {
        let widget = s.view().node(id).expect("widget");
        s.view().get(widget).expect("node").control.display_text()
    }

    #[test]
    fn test_scenario_a_value_patch() {
        let mut s = session_with(
            r#"[{"id":"Network","type":"module","o":1,"n":[{"id":"ssid","type":"text","o":1,"value":"home"}]}]"#,
        );
        s.apply_text(r#"{"ssid":{"value":"office"}}"#);
        assert_eq!(display(&s, "ssid"), "office");
        assert_eq!(
            s.store().find("ssid").unwrap().value,
            Some(Value::Text("office".into()))
        );
    }

    #[test]
    fn test_patch_unknown_id_is_skipped() {
        let mut s = session_with(r#"[{"id":"Network","type":"module","o":1}]"#);
        s.apply_text(r#"{"ghost":{"value":1}}"#);
        assert!(s.store().find("ghost").is_none());
    }

    #[test]
    fn test_idempotent_self_patch() {
        let snapshot = r#"[{"id":"Leds","type":"module","o":1,"n":[
            {"id":"bri","type":"range","o":1,"min":0,"max":255,"value":128}
        ]}]"#;
        let mut s = session_with(snapshot);
        let before = display(&s, "bri");
        s.apply_text(r#"{"bri":{"value":128}}"#);
        assert_eq!(display(&s, "bri"), before);
        s.apply_text(r#"{"bri":{"value":128}}"#);
        assert_eq!(display(&s, "bri"), before);
    }

    #[test]
    fn test_label_applies_capitalized() {
        let mut s = session_with(
            r#"[{"id":"Sys","type":"module","o":1,"n":[
                {"id":"restart","type":"button","o":1},
                {"id":"name","type":"text","o":2}
            ]}]"#,
        );
        s.apply_text(r#"{"restart":{"label":"reboot now"},"name":{"label":"host name"}}"#);

        let button = s.view().node("restart").unwrap();
        match &s.view().get(button).unwrap().control {
            Control::Button { caption, .. } => assert_eq!(caption, "Reboot Now"),
            other => panic!("expected button, got {other:?}"),
        }
        let field = s.view().node("name").unwrap();
        assert_eq!(s.view().get(field).unwrap().label, "Host Name");
    }

    #[test]
    fn test_comment_stored() {
        let mut s = session_with(
            r#"[{"id":"Net","type":"module","o":1,"n":[{"id":"ssid","type":"text","o":1}]}]"#,
        );
        s.apply_text(r#"{"ssid":{"comment":"2.4GHz only"}}"#);
        let widget = s.view().node("ssid").unwrap();
        assert_eq!(
            s.view().get(widget).unwrap().comment.as_deref(),
            Some("2.4GHz only")
        );
    }

    #[test]
    fn test_options_then_value_resolution_order() {
        let mut s = session_with(
            r#"[{"id":"Sys","type":"module","o":1,"n":[
                {"id":"reason","type":"select","o":1,"ro":true}
            ]}]"#,
        );
        // Options and value in one patch: options land first, so the
        // numeric value resolves to its display text.
        s.apply_text(r#"{"reason":{"options":["PowerOn","Watchdog","Panic"],"value":1}}"#);
        assert_eq!(display(&s, "reason"), "Watchdog");
    }

    #[test]
    fn test_options_overrule_existing_index_text() {
        let mut s = session_with(
            r#"[{"id":"Sys","type":"module","o":1,"n":[
                {"id":"reason","type":"select","o":1,"ro":true,"value":2}
            ]}]"#,
        );
        assert_eq!(display(&s, "reason"), "2");
        // A later options patch replaces the raw index with its label.
        s.apply_text(r#"{"reason":{"options":["PowerOn","Watchdog","Panic"]}}"#);
        assert_eq!(display(&s, "reason"), "Panic");
    }

    #[test]
    fn test_writable_select_gets_options_and_selection() {
        let mut s = session_with(
            r#"[{"id":"Leds","type":"module","o":1,"n":[{"id":"fx","type":"select","o":1}]}]"#,
        );
        s.apply_text(r#"{"fx":{"options":["Solid","Rainbow"],"value":1}}"#);
        let widget = s.view().node("fx").unwrap();
        match &s.view().get(widget).unwrap().control {
            Control::Dropdown { options, selected } => {
                assert_eq!(options.len(), 2);
                assert_eq!(selected, &Some(Value::Int(1)));
            }
            other => panic!("expected dropdown, got {other:?}"),
        }
        assert_eq!(display(&s, "fx"), "Rainbow");
    }

    #[test]
    fn test_scenario_d_log_slider_zero() {
        let mut s = session_with(
            r#"[{"id":"Leds","type":"module","o":1,"n":[
                {"id":"bri","type":"range","o":1,"min":0,"max":255,"log":true,"value":10}
            ]}]"#,
        );
        s.apply_text(r#"{"bri":{"value":0}}"#);
        let widget = s.view().node("bri").unwrap();
        match &s.view().get(widget).unwrap().control {
            Control::Slider { readout, value, .. } => {
                assert_eq!(readout, "0");
                assert_eq!(*value, 0.0);
            }
            other => panic!("expected slider, got {other:?}"),
        }
    }

    #[test]
    fn test_log_slider_readout_tracks_value() {
        let mut s = session_with(
            r#"[{"id":"Leds","type":"module","o":1,"n":[
                {"id":"bri","type":"range","o":1,"min":0,"max":255,"log":true,"value":0}
            ]}]"#,
        );
        s.apply_text(r#"{"bri":{"value":255}}"#);
        let widget = s.view().node("bri").unwrap();
        match &s.view().get(widget).unwrap().control {
            Control::Slider { readout, .. } => assert_eq!(readout, "255"),
            other => panic!("expected slider, got {other:?}"),
        }
    }

    #[test]
    fn test_url_value_updates_href() {
        let mut s = session_with(
            r#"[{"id":"Sys","type":"module","o":1,"n":[{"id":"docs","type":"url","o":1}]}]"#,
        );
        s.apply_text(r#"{"docs":{"value":"http://device.local/docs"}}"#);
        let widget = s.view().node("docs").unwrap();
        match &s.view().get(widget).unwrap().control {
            Control::Link { href, .. } => assert_eq!(href, "http://device.local/docs"),
            other => panic!("expected link, got {other:?}"),
        }
    }

    #[test]
    fn test_details_graft_replaces_subtree() {
        let mut s = session_with(
            r#"[{"id":"Leds","type":"module","o":1,"n":[
                {"id":"fx","type":"select","o":1,"n":[{"id":"speed","type":"range","o":1}]}
            ]}]"#,
        );
        assert!(s.view().node("speed").is_some());

        s.apply_text(
            r#"{"details":{"id":"fx","n":[
                {"id":"palette","type":"select","o":1},
                {"id":"intensity","type":"range","o":2}
            ]}}"#,
        );
        // Old subtree destroyed, new one grafted.
        assert!(s.view().node("speed").is_none());
        assert!(s.view().node("palette").is_some());
        assert!(s.view().node("intensity").is_some());
        assert_eq!(s.store().find("fx").unwrap().children.len(), 2);
    }

    #[test]
    fn test_details_graft_queues_and_flushes_dynamic_ids() {
        let mut s = session_with(
            r#"[{"id":"Leds","type":"module","o":1,"n":[{"id":"fx","type":"select","o":1}]}]"#,
        );
        s.sink_mut().sent.clear();
        s.apply_text(
            r#"{"details":{"id":"fx","n":[{"id":"palette","type":"select","o":1,"dynamic":true}]}}"#,
        );
        assert_eq!(
            s.sink().sent,
            vec![Command::DynamicResolve(vec!["palette".into()])]
        );
    }

    #[test]
    fn test_repeated_details_graft_leaves_no_orphans() {
        let mut s = session_with(
            r#"[{"id":"Leds","type":"module","o":1,"n":[{"id":"fx","type":"select","o":1}]}]"#,
        );
        let details = r#"{"details":{"id":"fx","n":[{"id":"palette","type":"select","o":1}]}}"#;
        s.apply_text(details);
        let count = s.view().node_count();
        s.apply_text(details);
        assert_eq!(s.view().node_count(), count);
    }

    #[test]
    fn test_json_blob_stored() {
        let mut s = session_with(
            r#"[{"id":"Leds","type":"module","o":1,"n":[{"id":"map","type":"canvas","o":1}]}]"#,
        );
        s.apply_text(r#"{"map":{"json":{"width":16,"height":16}}}"#);
        assert_eq!(
            s.json_blob("map").and_then(|b| b.get("width")).and_then(|w| w.as_i64()),
            Some(16)
        );
    }

    #[test]
    fn test_file_hydration_miss_is_noop() {
        // NullFetcher misses; the patch must not disturb anything else.
        let mut s = session_with(
            r#"[{"id":"Leds","type":"module","o":1,"n":[{"id":"map","type":"canvas","o":1}]}]"#,
        );
        s.apply_text(r#"{"map":{"file":"ledmap.json"}}"#);
        assert!(s.json_blob("map").is_none());
    }

    #[test]
    fn test_ack_keys_are_no_ops() {
        let mut s = session_with(r#"[{"id":"Net","type":"module","o":1}]"#);
        let widgets = s.view().node_count();
        s.apply_text(r#"{"dynamicResolve":["a"],"view":"vApp"}"#);
        assert_eq!(s.view().node_count(), widgets);
    }
}
