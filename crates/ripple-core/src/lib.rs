//! Ripple Core - Reactive object model with rule-driven change scopes
//!
//! This crate provides the core types of the ripple engine:
//! - Dynamic value types (`Value`, `ValueMap`) and declared property types
//! - A type registry with single inheritance, id generation and renaming
//! - Entities whose property accessors are built from their type chain
//! - Event scopes that batch property changes and resolve rule cascades
//! - Condition, validation and calculated-property rules
//!
//! ## Scopes
//!
//! Writes made inside [`Model::perform`] are collected and resolved when the
//! outermost scope exits. Rules triggered by those writes run once per
//! (rule, entity) per generation; their own writes form the next
//! generation, up to [`ModelConfig::max_resolution_passes`].
//!
//! ```
//! use ripple_core::{Model, PropertyDef, ValidationRule, ValueType};
//!
//! let mut model = Model::new();
//! let person = model.define_type("Person", None).unwrap();
//! model.add_property(person, PropertyDef::new("FirstName", ValueType::String)).unwrap();
//! let required = ValidationRule::required("FirstName").register(&mut model, person).unwrap();
//!
//! let p = model.register(person, Some("p1"), false).unwrap();
//! model.set(p, "FirstName", "").unwrap();
//! assert_eq!(
//!     model.condition(p, required).map(|c| c.message()),
//!     Some("First Name is required.")
//! );
//! ```

mod config;
mod entity;
mod error;
pub mod events;
mod format;
mod identity;
mod model;
mod observable;
pub mod path;
mod property;
pub mod rule;
mod scope;
mod ty;
mod value;

#[cfg(test)]
mod scenarios;

pub use config::ModelConfig;
pub use entity::{Entity, EntityMeta};
pub use error::{Error, Result};
pub use events::{Dispatcher, EntityInit, ModelEvent, Subscription, TypeEvents};
pub use format::Format;
pub use identity::{EntityId, PropertyId, RuleId, TypeId};
pub use model::Model;
pub use observable::{ListChange, ObservableList};
pub use path::PropertyPath;
pub use property::{Property, PropertyAccess, PropertyChange, PropertyDef};
pub use rule::{
    CalculatedRule, Condition, ConditionRule, ConditionType, Message, Rule, RuleOptions,
    RuleRecord, Severity, ValidationRule,
};
pub use ty::Type;
pub use value::{Value, ValueMap, ValueType};
