//! Document tree.
//!
//! A minimal arena-backed node tree: elements with ordered attributes, text
//! and comment nodes. Element managers hold [`NodeId`]s into it.

mod document;
mod spec;

pub use document::{Document, NodeId, NodeKind};
pub use spec::NodeSpec;
