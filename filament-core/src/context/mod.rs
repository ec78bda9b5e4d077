//! Context observation.
//!
//! This module provides the data model and the observation engine:
//!
//! - [`Value`], [`Object`], [`Array`]: dynamically typed context data whose
//!   containers are shared handles
//! - [`ContextManager`]: per-owner registry of listeners, accessors and
//!   array interceptions
//! - [`ContextRegistry`]: owner -> manager lookup
//! - [`Subscription`]: RAII handle for one registered callback

mod accessor;
mod manager;
pub mod path;
mod registry;
mod subscriber;
mod value;

pub use accessor::AccessorKind;
pub use manager::{ArrayCallback, ContextManager, Subscription, ValueCallback};
pub use registry::{ContextOwner, ContextRegistry};
pub use subscriber::{ListenerId, OwnerId};
pub use value::{Array, ArrayMethod, ArrayMutation, Object, Value};
