//! # helio-view — materialized widget tree
//!
//! Turns a snapshot of [`helio_model::Variable`] nodes into a retained tree
//! of UI controls, and keeps an id→widget index so the patch stream can
//! address any control — including table cells, whose identity is the
//! column id plus a row index — in O(1).
//!
//! This crate knows nothing about the wire or about patch semantics; it is
//! the structure the patch applier mutates.

pub mod render;
pub mod tree;
pub mod widget;

pub use render::{linear_to_logarithm, slider_readout, RenderOutcome, Renderer};
pub use tree::{ViewError, ViewNode, ViewTree, WidgetId, SCREEN_COLUMNS};
pub use widget::{resolve_option_label, Control, InputKind, WidgetKey};
