//! Property metadata and change/access notifications

use crate::events::{Dispatcher, Subscription};
use crate::format::Format;
use crate::identity::{EntityId, PropertyId, RuleId, TypeId};
use crate::value::{Value, ValueType};

/// Declaration of a property, passed to [`Model::add_property`](crate::Model::add_property)
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub(crate) name: String,
    pub(crate) value_type: ValueType,
    pub(crate) is_list: bool,
    pub(crate) is_static: bool,
    pub(crate) label: Option<String>,
    pub(crate) label_source: Option<String>,
    pub(crate) format: Option<String>,
}

impl PropertyDef {
    /// Declare a single-valued instance property
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            is_list: false,
            is_static: false,
            label: None,
            label_source: None,
            format: None,
        }
    }

    /// Make this a list property (values are `Value::List`)
    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    /// Store one value on the type, shared by every instance
    pub fn shared(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Human-readable label; may contain `[Token]` placeholders
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Path to a related entity against which a formatted label is evaluated
    pub fn label_source(mut self, path: impl Into<String>) -> Self {
        self.label_source = Some(path.into());
        self
    }

    /// Display format for values of this property
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// A property value change, delivered when the enclosing scope resolves
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub entity: EntityId,
    pub property: PropertyId,
    pub old_value: Value,
    pub new_value: Value,
}

/// A property read through the model
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAccess {
    pub entity: EntityId,
    pub property: PropertyId,
    pub value: Value,
}

/// Metadata of one declared property (one per name per type, not per instance)
#[derive(Debug)]
pub struct Property {
    pub(crate) id: PropertyId,
    pub(crate) containing_type: TypeId,
    pub(crate) name: String,
    pub(crate) value_type: ValueType,
    pub(crate) is_list: bool,
    pub(crate) is_static: bool,
    pub(crate) is_calculated: bool,
    pub(crate) label: String,
    pub(crate) label_format: Option<Format>,
    pub(crate) label_source: Option<String>,
    pub(crate) format: Option<String>,
    pub(crate) rules: Vec<RuleId>,
    pub(crate) static_value: Value,
    pub(crate) changed: Dispatcher<PropertyChange>,
    pub(crate) accessed: Dispatcher<PropertyAccess>,
}

impl Property {
    pub(crate) fn new(id: PropertyId, containing_type: TypeId, def: PropertyDef) -> crate::Result<Self> {
        let label = def.label.unwrap_or_else(|| humanize(&def.name));
        let label_format = Format::parse(&label)?;
        let label_format = label_format.has_tokens().then_some(label_format);
        let static_value = default_value(def.is_list);

        Ok(Self {
            id,
            containing_type,
            name: def.name,
            value_type: def.value_type,
            is_list: def.is_list,
            is_static: def.is_static,
            is_calculated: false,
            label,
            label_format,
            label_source: def.label_source,
            format: def.format,
            rules: Vec::new(),
            static_value,
            changed: Dispatcher::new(),
            accessed: Dispatcher::new(),
        })
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    /// The type that declares this property
    pub fn containing_type(&self) -> TypeId {
        self.containing_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_list(&self) -> bool {
        self.is_list
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether a calculated rule assigns this property
    pub fn is_calculated(&self) -> bool {
        self.is_calculated
    }

    /// The label text as declared (may contain format tokens)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the label contains `[Token]` placeholders
    pub fn label_is_format(&self) -> bool {
        self.label_format.is_some()
    }

    pub fn label_format(&self) -> Option<&Format> {
        self.label_format.as_ref()
    }

    pub fn label_source(&self) -> Option<&str> {
        self.label_source.as_deref()
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Rules registered against this property, in registration order
    pub fn rules(&self) -> &[RuleId] {
        &self.rules
    }

    /// The value a fresh instance starts with
    pub fn default_value(&self) -> Value {
        default_value(self.is_list)
    }

    /// Subscribe to changes of this property, optionally for one entity only
    pub(crate) fn on_changed(
        &mut self,
        entity: Option<EntityId>,
        handler: impl Fn(&PropertyChange) + 'static,
    ) -> Subscription {
        self.changed.subscribe(move |change| {
            if entity.map_or(true, |e| e == change.entity) {
                handler(change)
            }
        })
    }

    /// Subscribe to reads of this property, optionally for one entity only
    pub(crate) fn on_accessed(
        &mut self,
        entity: Option<EntityId>,
        handler: impl Fn(&PropertyAccess) + 'static,
    ) -> Subscription {
        self.accessed.subscribe(move |access| {
            if entity.map_or(true, |e| e == access.entity) {
                handler(access)
            }
        })
    }

    pub(crate) fn add_rule(&mut self, rule: RuleId) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }
}

fn default_value(is_list: bool) -> Value {
    if is_list {
        Value::List(Vec::new())
    } else {
        Value::Null
    }
}

/// Turn a property name into a label: `FirstName` -> `First Name`
pub(crate) fn humanize(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            out.push(' ');
            continue;
        }
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("FirstName"), "First Name");
        assert_eq!(humanize("Id"), "Id");
        assert_eq!(humanize("HTMLBody"), "HTML Body");
        assert_eq!(humanize("zip_code"), "zip code");
    }

    #[test]
    fn test_property_defaults() {
        let prop = Property::new(
            PropertyId(0),
            TypeId(0),
            PropertyDef::new("Tags", ValueType::String).list(),
        )
        .unwrap();

        assert_eq!(prop.label(), "Tags");
        assert!(prop.is_list());
        assert!(!prop.is_static());
        assert!(!prop.is_calculated());
        assert!(!prop.label_is_format());
        assert_eq!(prop.default_value(), Value::List(vec![]));
    }

    #[test]
    fn test_formatted_label() {
        let prop = Property::new(
            PropertyId(1),
            TypeId(0),
            PropertyDef::new("Phone", ValueType::String).label("[FirstName]'s phone"),
        )
        .unwrap();

        assert!(prop.label_is_format());
        let paths: Vec<_> = prop.label_format().unwrap().paths().collect();
        assert_eq!(paths, vec!["FirstName"]);
    }

    #[test]
    fn test_rules_deduplicated() {
        let mut prop =
            Property::new(PropertyId(0), TypeId(0), PropertyDef::new("A", ValueType::Int)).unwrap();
        prop.add_rule(RuleId(2));
        prop.add_rule(RuleId(1));
        prop.add_rule(RuleId(2));
        assert_eq!(prop.rules(), &[RuleId(2), RuleId(1)]);
    }

    #[test]
    fn test_entity_scoped_subscription() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut prop =
            Property::new(PropertyId(0), TypeId(0), PropertyDef::new("A", ValueType::Int)).unwrap();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        prop.on_changed(Some(EntityId(1)), move |_| h.set(h.get() + 1));

        for entity in [EntityId(1), EntityId(2)] {
            prop.changed.dispatch(&PropertyChange {
                entity,
                property: PropertyId(0),
                old_value: Value::Null,
                new_value: Value::Int(1),
            });
        }
        assert_eq!(hits.get(), 1);
    }
}
