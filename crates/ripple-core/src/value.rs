//! Dynamic property values and declared value types

use crate::identity::{EntityId, TypeId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamic value stored in an entity property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// No value / null
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Point in time
    Date(DateTime<Utc>),
    /// Reference to another entity
    Entity(EntityId),
    /// List of values (list properties)
    List(Vec<Value>),
}

/// Initial property values keyed by property name
///
/// Uses IndexMap so values are assigned in the order they were given.
pub type ValueMap = IndexMap<String, Value>;

impl Value {
    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as a float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a date
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Try to get this value as an entity reference
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Value::Entity(id) => Some(*id),
            _ => None,
        }
    }

    /// Try to get this value as a list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Entities referenced directly by this value (a reference or a list of references)
    pub fn entities(&self) -> Vec<EntityId> {
        match self {
            Value::Entity(id) => vec![*id],
            Value::List(items) => items.iter().filter_map(Value::as_entity).collect(),
            _ => Vec::new(),
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Entity(_) => "entity",
            Value::List(_) => "list",
        }
    }

    /// Check if this value is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::Entity(_) => true,
            Value::List(list) => !list.is_empty(),
        }
    }

    /// Value equality used to suppress no-op writes
    ///
    /// Floats compare by bit pattern so that `NaN` settles instead of
    /// re-triggering forever. `Int` and `Float` never compare equal.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits() || a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    /// Renders the value the way it appears in formatted text (no quoting)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Entity(id) => write!(f, "{}", id),
            Value::List(list) => {
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
        }
    }
}

// Convenient From implementations
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Entity(id)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(vec: Vec<T>) -> Self {
        Value::List(vec.into_iter().map(Into::into).collect())
    }
}

/// Declared type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Accepts any value
    Any,
    Bool,
    Int,
    /// Accepts integers as well
    Float,
    String,
    Date,
    /// Reference to an entity of the given type or one of its subtypes
    Entity(TypeId),
}

impl ValueType {
    /// Check whether a single (non-list) value is assignable to this type
    ///
    /// Null is always assignable. Entity references are only checked for
    /// shape here; the model checks the referenced entity's type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ValueType::Any, _) => true,
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::Int, Value::Int(_)) => true,
            (ValueType::Float, Value::Float(_) | Value::Int(_)) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Date, Value::Date(_)) => true,
            (ValueType::Entity(_), Value::Entity(_)) => true,
            _ => false,
        }
    }

    /// The entity type referenced by this value type, if any
    pub fn entity_type(&self) -> Option<TypeId> {
        match self {
            ValueType::Entity(ty) => Some(*ty),
            _ => None,
        }
    }

    /// Get the name of this value type
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Date => "date",
            ValueType::Entity(_) => "entity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Float(3.5).as_float(), Some(3.5));
        assert_eq!(Value::Int(42).as_float(), Some(42.0));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Entity(EntityId(4)).as_entity(), Some(EntityId(4)));
    }

    #[test]
    fn test_value_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::String("".into()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }

    #[test]
    fn test_same_as() {
        assert!(Value::Float(f64::NAN).same_as(&Value::Float(f64::NAN)));
        assert!(Value::from("a").same_as(&Value::from("a")));
        assert!(!Value::Int(1).same_as(&Value::Float(1.0)));
        assert!(Value::from(vec![1i64, 2]).same_as(&Value::from(vec![1i64, 2])));
        assert!(!Value::from(vec![1i64, 2]).same_as(&Value::from(vec![2i64, 1])));
    }

    #[test]
    fn test_display_is_unquoted() {
        assert_eq!(Value::from("Dave").to_string(), "Dave");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), "a, b");
    }

    #[test]
    fn test_entities() {
        let list = Value::List(vec![
            Value::Entity(EntityId(1)),
            Value::Null,
            Value::Entity(EntityId(2)),
        ]);
        assert_eq!(list.entities(), vec![EntityId(1), EntityId(2)]);
        assert!(Value::Int(3).entities().is_empty());
    }

    #[test]
    fn test_value_type_accepts() {
        assert!(ValueType::String.accepts(&Value::Null));
        assert!(ValueType::Float.accepts(&Value::Int(1)));
        assert!(!ValueType::Int.accepts(&Value::Float(1.0)));
        assert!(ValueType::Entity(TypeId(0)).accepts(&Value::Entity(EntityId(9))));
        assert!(!ValueType::Bool.accepts(&Value::from("true")));
        assert_eq!(ValueType::Entity(TypeId(2)).entity_type(), Some(TypeId(2)));
    }
}
