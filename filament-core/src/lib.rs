//! Filament Core
//!
//! This crate provides the data-binding core of the Filament UI framework.
//! It implements:
//!
//! - A context observation engine over dynamically typed object graphs
//! - A compile/bind/clone pipeline that attaches document nodes to that data
//! - An in-memory document tree the pipeline operates on
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `context`: values, path accessors, per-owner context managers
//! - `binding`: node maps, element managers, controls, templates
//! - `dom`: the document arena and serde-described node trees
//! - `config`: engine-wide configuration
//! - `error`: error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use filament_core::binding::{ControlRegistry, ElementManager, Environment, MemoryTemplates};
//! use filament_core::config::Config;
//! use filament_core::dom::{Document, NodeSpec};
//! use filament_core::context::Value;
//!
//! let document = Document::new();
//! let node = document.build(&NodeSpec::element("p").child(NodeSpec::text("Hi {{context.name}}")));
//! document.append_child(document.root(), node)?;
//!
//! let env = Environment::new(
//!     Config::default(),
//!     document.clone(),
//!     Arc::new(ControlRegistry::new()),
//!     Arc::new(MemoryTemplates::new()),
//! );
//! env.set_context(Value::from_json(serde_json::json!({ "name": "Ada" })));
//!
//! let root = ElementManager::create(&env, node, None)?.unwrap();
//! root.bind_and_load().await?;
//! assert_eq!(document.text_content(node), "Hi Ada");
//! ```

pub mod binding;
pub mod config;
pub mod context;
pub mod dom;
pub mod error;

pub use binding::{ElementManager, Environment};
pub use config::Config;
pub use context::{ContextManager, ContextRegistry, Value};
pub use error::BindError;
