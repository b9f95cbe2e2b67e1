//! # helio-model — variable tree mirror for controller panels
//!
//! The data model behind a helio session: a hierarchical tree of
//! [`Variable`] nodes as pushed by the controller in its one-time snapshot,
//! and the [`ModelStore`] that keeps the client-side mirror of that tree
//! consistent while partial updates stream in.
//!
//! The tree is owned top-down: a parent exclusively owns its children, so
//! ownership and acyclicity are structural, not runtime invariants. After
//! the snapshot the tree is only mutated locally — subtree grafts, attribute
//! merges and table row rewrites — and is discarded wholesale on reconnect.

pub mod store;
pub mod value;
pub mod var;

pub use store::ModelStore;
pub use value::{OptionEntry, Value};
pub use var::{init_cap, sort_siblings, sort_tree, DynamicState, VarKind, VarPatch, Variable};
