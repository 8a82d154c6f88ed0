//! Entity to JSON serialization

use crate::{Error, Result};
use ripple_core::{EntityId, Model, Property, TypeId, Value};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::HashMap;
use tracing::trace;

/// One key/value pair of serialized output
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedProperty {
    pub key: String,
    pub value: JsonValue,
}

impl SerializedProperty {
    pub fn new(key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Transforms the serialized name and value of a model property
pub trait PropertyConverter {
    /// Whether this converter handles the property
    fn should_convert(&self, model: &Model, property: &Property) -> bool;

    /// Convert the property's value; `None` leaves the property out
    fn convert(&self, model: &Model, property: &Property, value: &Value)
        -> Option<SerializedProperty>;
}

/// Adds key/value pairs to the output for entities of a type
pub trait PropertyInjector {
    fn inject(&self, model: &Model, entity: EntityId) -> Vec<SerializedProperty>;
}

/// Produces JSON objects from entities
#[derive(Default)]
pub struct EntitySerializer {
    converters: Vec<Box<dyn PropertyConverter>>,
    injectors: HashMap<TypeId, Vec<Box<dyn PropertyInjector>>>,
}

impl EntitySerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a converter
    ///
    /// Register converters from general to specific: when several would
    /// handle a property, the one registered last is used.
    pub fn register_property_converter(&mut self, converter: impl PropertyConverter + 'static) {
        self.converters.insert(0, Box::new(converter));
    }

    /// Add an injector for a type; it also applies to the type's subtypes
    pub fn register_property_injector(
        &mut self,
        ty: TypeId,
        injector: impl PropertyInjector + 'static,
    ) {
        self.injectors.entry(ty).or_default().push(Box::new(injector));
    }

    /// Serialize an entity's stored properties, then injected pairs
    ///
    /// Null values are left out unless `serialize_null` is set. The flag
    /// only applies to this entity: related entities are serialized in place
    /// without their nulls, and a reference back to an entity that is
    /// already being serialized is written as its object id.
    pub fn serialize(
        &self,
        model: &Model,
        entity: EntityId,
        serialize_null: bool,
    ) -> Result<Map<String, JsonValue>> {
        let mut path = Vec::new();
        self.serialize_on_path(model, entity, serialize_null, &mut path)
    }

    /// Serialize an entity to pretty-printed JSON text
    pub fn to_string_pretty(
        &self,
        model: &Model,
        entity: EntityId,
        serialize_null: bool,
    ) -> Result<String> {
        let object = self.serialize(model, entity, serialize_null)?;
        serde_json::to_string_pretty(&object).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn serialize_on_path(
        &self,
        model: &Model,
        entity: EntityId,
        serialize_null: bool,
        path: &mut Vec<EntityId>,
    ) -> Result<Map<String, JsonValue>> {
        let ty = model
            .entity(entity)
            .ok_or_else(|| ripple_core::Error::EntityNotFound(entity.to_string()))?
            .type_id();

        path.push(entity);
        let mut pairs = Vec::new();
        for id in model.properties_of(ty)? {
            let Some(property) = model.property_meta(id) else {
                continue;
            };
            if property.is_calculated() || property.is_static() {
                continue;
            }

            let value = model.value(entity, id)?;
            let converted = match self
                .converters
                .iter()
                .find(|c| c.should_convert(model, property))
            {
                Some(converter) => converter.convert(model, property, &value),
                None => Some(SerializedProperty {
                    key: property.name().to_string(),
                    value: self.convert_value(model, &value, serialize_null, path)?,
                }),
            };
            pairs.extend(converted);
        }
        path.pop();

        for t in model.chain(ty)? {
            for injector in self.injectors.get(&t).into_iter().flatten() {
                pairs.extend(injector.inject(model, entity));
            }
        }

        let mut object = Map::new();
        for pair in pairs {
            if object.contains_key(&pair.key) || (!serialize_null && pair.value.is_null()) {
                continue;
            }
            object.insert(pair.key, pair.value);
        }
        Ok(object)
    }

    fn convert_value(
        &self,
        model: &Model,
        value: &Value,
        serialize_null: bool,
        path: &mut Vec<EntityId>,
    ) -> Result<JsonValue> {
        Ok(match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Date(d) => JsonValue::String(d.to_rfc3339()),
            Value::Entity(related) if path.contains(related) => {
                let id = model
                    .entity(*related)
                    .ok_or_else(|| ripple_core::Error::EntityNotFound(related.to_string()))?
                    .id()
                    .to_string();
                trace!(%related, id = %id, "back-reference written as object id");
                JsonValue::String(id)
            }
            Value::Entity(related) => {
                JsonValue::Object(self.serialize_on_path(model, *related, false, path)?)
            }
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.convert_value(model, item, serialize_null, path))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}
