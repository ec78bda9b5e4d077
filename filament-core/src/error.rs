//! Error types.
//!
//! Every fallible operation in the crate returns one of these enums. The
//! pipeline errors are `Clone` because template futures are shared between
//! every awaiter of a subtree.

use thiserror::Error;

use crate::dom::NodeId;

/// Structural errors raised by the in-memory document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("node {0:?} is not a text or comment node")]
    NotText(NodeId),

    #[error("node {0:?} has no parent")]
    NoParent(NodeId),

    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("cannot insert {0:?} into its own subtree")]
    Cycle(NodeId),
}

/// Errors raised while parsing interpolation markup or context selectors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("unterminated interpolation starting at byte {0}")]
    Unterminated(usize),

    #[error("empty expression")]
    Empty,

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("expected {expected} identifier(s), found {found}")]
    IdentifierCount { expected: usize, found: usize },
}

/// Errors reported by a template source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template `{0}` not found")]
    NotFound(String),

    #[error("template `{key}` failed to load: {reason}")]
    Fetch { key: String, reason: String },
}

/// Errors raised by the compile/bind/clone pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("no control registered as `{0}`")]
    UnknownControl(String),

    #[error("template resolution failed for `{control}`: {source}")]
    Template {
        control: String,
        #[source]
        source: TemplateError,
    },

    #[error("template for `{0}` has not resolved yet")]
    TemplateNotReady(String),

    #[error("clone target is missing node #{index} under {parent:?}")]
    StructureMismatch { parent: NodeId, index: usize },

    #[error("manager has been disposed")]
    Disposed,

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("interpolation delimiters must be non-empty")]
    EmptyDelimiter,
}
