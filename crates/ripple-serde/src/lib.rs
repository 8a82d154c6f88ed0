//! Ripple Serde - Plain JSON representations of ripple entities
//!
//! [`EntitySerializer`] walks an entity's stored properties and produces a
//! `serde_json` object. Two hooks shape the output:
//!
//! - [`PropertyConverter`] - renames or transforms a property (or drops it)
//! - [`PropertyInjector`] - adds extra key/value pairs for a type
//!
//! Calculated and static properties are never written. Once a key has been
//! written it is not overwritten, so model properties win over injected
//! pairs with the same key.
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{Model, PropertyDef, ValueType};
//! use ripple_serde::EntitySerializer;
//!
//! let mut model = Model::new();
//! let user = model.define_type("UserRef", None).unwrap();
//! model.add_property(user, PropertyDef::new("FirstName", ValueType::String)).unwrap();
//! let u = model.register(user, Some("u1"), false).unwrap();
//! model.set(u, "FirstName", "Dave").unwrap();
//!
//! let json = EntitySerializer::new().serialize(&model, u, false).unwrap();
//! assert_eq!(json["FirstName"], "Dave");
//! ```

mod error;
mod serializer;

pub use error::{Error, Result};
pub use serializer::{EntitySerializer, PropertyConverter, PropertyInjector, SerializedProperty};
