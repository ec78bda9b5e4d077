//! Compile/bind/clone pipeline.
//!
//! This module turns a document subtree into a tree of [`ElementManager`]s:
//!
//! - discovery builds a shared [`NodeMap`] per static node
//! - `create` compiles a subtree, resolving controls through an [`Injector`]
//!   and templates through a [`TemplateSource`]
//! - `bind_and_load` subscribes every binding to the context engine and
//!   loads controls bottom-up
//! - `clone_into` and [`BindableTemplates::stamp`] produce fresh managers for
//!   copies of an already compiled subtree
//!
//! Everything a manager needs from outside is carried by the shared
//! [`Environment`].

mod control;
mod deferred;
mod element;
mod environment;
mod expression;
mod node_map;
mod template;
mod templates;

pub use control::{
    Control, ControlBase, ControlDescriptor, ControlKind, ControlRegistry, Injector, Resource,
};
pub use deferred::DeferredLoads;
pub use element::{ElementManager, LoadFuture, ManagerRef, Phase};
pub use environment::{Environment, RootScope};
pub use expression::{ContextSelector, Expression, Interpolation, Part};
pub use node_map::{Binding, BindingTarget, NodeMap};
pub use template::{MemoryTemplates, TemplateFuture, TemplateRef, TemplateSource};
pub use templates::BindableTemplates;
