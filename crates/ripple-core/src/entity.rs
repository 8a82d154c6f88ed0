//! Entity instances and property value access
//!
//! Each entity carries an accessor table from property name to slot. The
//! table is built when the entity is registered (most-derived declarations
//! first, so the nearest declaration of a name wins) and retro-fitted when a
//! type in its chain gains a property.

use crate::error::{Error, Result};
use crate::format::Format;
use crate::identity::{EntityId, PropertyId, RuleId, TypeId};
use crate::model::Model;
use crate::property::{PropertyAccess, PropertyChange};
use crate::rule::Condition;
use crate::value::Value;
use indexmap::IndexMap;

/// Identity of an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    pub(crate) id: String,
    pub(crate) is_new: bool,
    pub(crate) legacy_ids: Vec<String>,
    pub(crate) type_id: TypeId,
}

impl EntityMeta {
    /// The current object id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the id was generated locally (not yet persisted)
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// The id the entity had before its most recent rename
    pub fn legacy_id(&self) -> Option<&str> {
        self.legacy_ids.last().map(String::as_str)
    }

    /// Every id the entity was known by before its current one, oldest first
    pub fn legacy_ids(&self) -> &[String] {
        &self.legacy_ids
    }

    /// The runtime type of the entity
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

/// Where a property value lives
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    /// Stored on the instance
    Instance { property: PropertyId, value: Value },
    /// Stored on the property, shared by all instances
    Static { property: PropertyId },
}

impl Slot {
    pub(crate) fn property(&self) -> PropertyId {
        match self {
            Slot::Instance { property, .. } | Slot::Static { property } => *property,
        }
    }
}

/// A registered entity
#[derive(Debug)]
pub struct Entity {
    pub(crate) handle: EntityId,
    pub(crate) meta: EntityMeta,
    pub(crate) slots: IndexMap<String, Slot>,
    pub(crate) conditions: IndexMap<RuleId, Condition>,
}

impl Entity {
    pub fn handle(&self) -> EntityId {
        self.handle
    }

    pub fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    /// Shortcut for `meta().id()`
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn type_id(&self) -> TypeId {
        self.meta.type_id
    }

    pub fn is_new(&self) -> bool {
        self.meta.is_new
    }

    /// Check if the entity exposes a property with this name
    pub fn has_property(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Names of every property the entity exposes
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// The property bound to a name on this entity
    pub fn property(&self, name: &str) -> Option<PropertyId> {
        self.slots.get(name).map(Slot::property)
    }

    /// Conditions currently attached to the entity, in the order they appeared
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values()
    }
}

impl Model {
    /// Read a property by name
    ///
    /// Raises the property's `accessed` notification.
    pub fn get(&self, entity: EntityId, name: &str) -> Result<Value> {
        let property = self.slot_property(entity, name)?;
        self.value(entity, property)
    }

    /// Read a property by handle
    pub fn value(&self, entity: EntityId, property: PropertyId) -> Result<Value> {
        let value = self.read_raw(entity, property)?;
        if let Some(meta) = self.properties.get(property.index()) {
            meta.accessed.dispatch(&PropertyAccess {
                entity,
                property,
                value: value.clone(),
            });
        }
        Ok(value)
    }

    /// Read a value without raising notifications; `None` if unavailable
    pub fn peek(&self, entity: EntityId, property: PropertyId) -> Option<Value> {
        self.read_raw(entity, property).ok()
    }

    /// Write a property by name
    pub fn set(&mut self, entity: EntityId, name: &str, value: impl Into<Value>) -> Result<()> {
        let property = self.slot_property(entity, name)?;
        self.set_value(entity, property, value)
    }

    /// Write a property by handle
    ///
    /// The value is type-checked; writing the value the property already
    /// holds is a no-op and records nothing. Otherwise the change is
    /// captured by the current event scope, or by a scope created for this
    /// write when none is active.
    pub fn set_value(
        &mut self,
        entity: EntityId,
        property: PropertyId,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        if !self.scope.is_active() {
            return self.perform(|m| m.set_value(entity, property, value));
        }

        self.check_assignable(property, &value)?;
        let old_value = self.read_raw(entity, property)?;
        if old_value.same_as(&value) {
            return Ok(());
        }

        self.write_raw(entity, property, value.clone())?;
        self.scope.record(PropertyChange {
            entity,
            property,
            old_value,
            new_value: value,
        });
        Ok(())
    }

    /// Render an entity with its type's format, falling back to its object id
    pub fn display(&self, entity: EntityId) -> Result<String> {
        let data = self.entity_ref(entity)?;
        let format = self
            .chain(data.meta.type_id)?
            .into_iter()
            .find_map(|t| self.types[t.index()].format.as_ref());
        match format {
            Some(format) => format.evaluate(self, entity),
            None => Ok(data.meta.id.clone()),
        }
    }

    /// Render an entity with an explicit format, e.g. `"[FirstName] [LastName]"`
    pub fn to_string(&self, entity: EntityId, format: &str) -> Result<String> {
        Format::parse(format)?.evaluate(self, entity)
    }

    /// Conditions attached to an entity
    pub fn conditions(&self, entity: EntityId) -> Result<Vec<&Condition>> {
        Ok(self.entity_ref(entity)?.conditions.values().collect())
    }

    /// Conditions attached to an entity that concern one property
    pub fn property_conditions(
        &self,
        entity: EntityId,
        property: PropertyId,
    ) -> Result<Vec<&Condition>> {
        Ok(self
            .entity_ref(entity)?
            .conditions
            .values()
            .filter(|c| c.properties().contains(&property))
            .collect())
    }

    /// The condition produced by one rule on an entity, if present
    pub fn condition(&self, entity: EntityId, rule: RuleId) -> Option<&Condition> {
        self.entities.get(&entity)?.conditions.get(&rule)
    }

    pub(crate) fn slot_property(&self, entity: EntityId, name: &str) -> Result<PropertyId> {
        let data = self.entity_ref(entity)?;
        data.property(name).ok_or_else(|| {
            Error::PropertyNotFound(format!("{}.{}", self.type_name(data.meta.type_id), name))
        })
    }

    pub(crate) fn read_raw(&self, entity: EntityId, property: PropertyId) -> Result<Value> {
        let data = self.entity_ref(entity)?;
        let meta = self.property_ref(property)?;
        match data.slots.get(&meta.name) {
            Some(Slot::Instance { property: p, value }) if *p == property => Ok(value.clone()),
            Some(Slot::Static { property: p }) if *p == property => Ok(meta.static_value.clone()),
            _ => Err(Error::PropertyNotFound(format!(
                "{}.{}",
                self.type_name(data.meta.type_id),
                meta.name
            ))),
        }
    }

    fn write_raw(&mut self, entity: EntityId, property: PropertyId, value: Value) -> Result<()> {
        let name = self.property_ref(property)?.name.clone();
        let data = self
            .entities
            .get_mut(&entity)
            .ok_or_else(|| Error::EntityNotFound(entity.to_string()))?;

        match data.slots.get_mut(&name) {
            Some(Slot::Instance { property: p, value: slot }) if *p == property => {
                *slot = value;
                Ok(())
            }
            Some(Slot::Static { property: p }) if *p == property => {
                self.properties[property.index()].static_value = value;
                Ok(())
            }
            _ => Err(Error::PropertyNotFound(name)),
        }
    }

    fn check_assignable(&self, property: PropertyId, value: &Value) -> Result<()> {
        let meta = self.property_ref(property)?;
        let mismatch = |got: &Value| Error::TypeError {
            expected: if meta.is_list {
                format!("list of {} for '{}'", meta.value_type.name(), meta.name)
            } else {
                format!("{} for '{}'", meta.value_type.name(), meta.name)
            },
            got: got.type_name().to_string(),
        };

        let items: &[Value] = match (meta.is_list, value) {
            (true, Value::List(items)) => items,
            (true, other) => return Err(mismatch(other)),
            (false, Value::List(_)) if meta.value_type != crate::ValueType::Any => {
                return Err(mismatch(value))
            }
            (false, single) => std::slice::from_ref(single),
        };

        for item in items {
            if !meta.value_type.accepts(item) {
                return Err(mismatch(item));
            }
            if let (Some(expected), Value::Entity(related)) = (meta.value_type.entity_type(), item)
            {
                let actual = self.entity_ref(*related)?.meta.type_id;
                if !self.is_same_or_subclass(actual, expected) {
                    return Err(Error::TypeError {
                        expected: self.type_name(expected).to_string(),
                        got: self.type_name(actual).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn set_condition(&mut self, entity: EntityId, condition: Condition) {
        let rule = condition.rule();
        let Some(data) = self.entities.get_mut(&entity) else {
            return;
        };
        let appeared = data.conditions.insert(rule, condition).is_none();
        if appeared {
            self.events.dispatch(&crate::ModelEvent::ConditionChanged {
                entity,
                rule,
                present: true,
            });
        }
    }

    pub(crate) fn clear_condition(&mut self, entity: EntityId, rule: RuleId) {
        let Some(data) = self.entities.get_mut(&entity) else {
            return;
        };
        if data.conditions.shift_remove(&rule).is_some() {
            self.events.dispatch(&crate::ModelEvent::ConditionChanged {
                entity,
                rule,
                present: false,
            });
        }
    }
}
