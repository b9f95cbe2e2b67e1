//! Batched dynamic-resolution requests.

use helio_sync::Command;

use crate::session::CommandSink;

/// Flush threshold: the queue drains as soon as it holds more than this
/// many ids, bounding outbound frame size.
pub const RESOLVE_BATCH_LIMIT: usize = 8;

/// Ids waiting for server-computed cosmetics (labels, options, comments).
///
/// Besides the size-triggered flush, the session drains any remainder
/// unconditionally after the full-tree render, after a details graft and
/// after a row regeneration.
#[derive(Debug, Default)]
pub struct ResolveQueue {
    ids: Vec<String>,
}

impl ResolveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Queue one id; flushes when the count first exceeds the batch limit.
    pub fn push<S: CommandSink>(&mut self, id: String, sink: &mut S) {
        self.ids.push(id);
        if self.ids.len() > RESOLVE_BATCH_LIMIT {
            self.flush(sink);
        }
    }

    /// Drain whatever is queued into one command. No-op when empty.
    pub fn flush<S: CommandSink>(&mut self, sink: &mut S) {
        if self.ids.is_empty() {
            return;
        }
        sink.send(Command::DynamicResolve(std::mem::take(&mut self.ids)));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
