//! # helio-client — the synchronization session
//!
//! Ties the mirror ([`helio_model`]), the materialized view
//! ([`helio_view`]) and the channel ([`helio_sync`]) together: one
//! [`Session`] receives channel events, applies the snapshot and the patch
//! stream to both sides of the pair, and turns user interaction into
//! outbound commands.
//!
//! ## Pipeline
//!
//! ```text
//! ┌────────────┐  ChannelEvent   ┌─────────────────────────────┐
//! │ Connection │ ──────────────► │ Session                     │
//! │ (1 socket) │ ◄────────────── │  ModelStore ─┬─ ViewTree    │
//! └────────────┘    Command      │  ResolveQueue│  PatchApplier│
//!                                └──────────────┴──────────────┘
//! ```
//!
//! The session is single-threaded and callback-driven: one inbound event
//! is fully processed before the next, so patch application is never
//! reentrant.

mod patch;
pub mod queue;
pub mod session;
mod table;

pub use queue::{ResolveQueue, RESOLVE_BATCH_LIMIT};
pub use session::{CommandSink, RecordingSink, Session};
