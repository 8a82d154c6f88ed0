//! Calculated properties

use super::{Rule, RuleOptions};
use crate::error::{Error, Result};
use crate::identity::{EntityId, PropertyId, RuleId, TypeId};
use crate::model::Model;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

pub type CalculateFn = Rc<dyn Fn(&Model, EntityId) -> Result<Value>>;

/// Builder for a rule that assigns a property from others
///
/// The result is written through the normal write path, so an unchanged
/// result records nothing and triggers nothing.
///
/// ```
/// use ripple_core::{CalculatedRule, Model, PropertyDef, ValueType, ValueMap};
///
/// let mut model = Model::new();
/// let user = model.define_type("UserRef", None).unwrap();
/// for name in ["FirstName", "LastName", "FullName"] {
///     model.add_property(user, PropertyDef::new(name, ValueType::String)).unwrap();
/// }
/// CalculatedRule::new("FullName", |m, e| {
///     Ok(m.to_string(e, "[FirstName] [LastName]")?.into())
/// })
/// .depends_on("FirstName,LastName")
/// .register(&mut model, user)
/// .unwrap();
///
/// let mut props = ValueMap::new();
/// props.insert("FirstName".into(), "Dave".into());
/// props.insert("LastName".into(), "Smith".into());
/// let u = model.create(user, props).unwrap();
/// assert_eq!(model.get(u, "FullName").unwrap().as_str(), Some("Dave Smith"));
/// ```
#[derive(Clone)]
pub struct CalculatedRule {
    property: String,
    calculate: CalculateFn,
    options: RuleOptions,
}

impl CalculatedRule {
    pub fn new(
        property: impl Into<String>,
        calculate: impl Fn(&Model, EntityId) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            property: property.into(),
            calculate: Rc::new(calculate),
            options: RuleOptions::new().on_init(true),
        }
    }

    /// Properties the calculation reads, e.g. `"{FirstName,LastName}"`
    pub fn depends_on(mut self, expression: impl Into<String>) -> Self {
        self.options = self.options.on_change_of(expression);
        self
    }

    /// Whether to calculate when an entity is constructed (default `true`)
    pub fn on_init(mut self, on_init: bool) -> Self {
        self.options = self.options.on_init(on_init);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options = self.options.name(name);
        self
    }

    /// Register against `root` and mark the target property as calculated
    pub fn register(self, model: &mut Model, root: TypeId) -> Result<RuleId> {
        let property = model.property(root, &self.property).ok_or_else(|| {
            Error::PropertyNotFound(format!("{}.{}", model.type_name(root), self.property))
        })?;

        let options = self.options.properties(self.property.clone());
        let rule = model.add_rule(
            root,
            options,
            Rc::new(CalculatedProperty {
                property,
                calculate: self.calculate,
            }),
        )?;
        model.property_mut(property)?.is_calculated = true;
        Ok(rule)
    }
}

impl fmt::Debug for CalculatedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatedRule")
            .field("property", &self.property)
            .field("options", &self.options)
            .finish()
    }
}

struct CalculatedProperty {
    property: PropertyId,
    calculate: CalculateFn,
}

impl Rule for CalculatedProperty {
    fn execute(&self, model: &mut Model, _rule: RuleId, entity: EntityId) -> Result<()> {
        let value = (self.calculate)(model, entity)?;
        model.set_value(entity, self.property, value)
    }

    fn default_name(&self) -> &str {
        "CalculatedProperty"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyDef;
    use crate::value::ValueType;
    use std::cell::Cell;

    fn totals() -> (Model, TypeId, EntityId) {
        let mut model = Model::new();
        let line = model.define_type("Line", None).unwrap();
        for (name, ty) in [
            ("Price", ValueType::Int),
            ("Quantity", ValueType::Int),
            ("Total", ValueType::Int),
        ] {
            model.add_property(line, PropertyDef::new(name, ty)).unwrap();
        }
        let entity = model.register(line, Some("l1"), false).unwrap();
        (model, line, entity)
    }

    fn product(m: &Model, e: EntityId) -> Result<Value> {
        let price = m.get(e, "Price")?.as_int().unwrap_or(0);
        let quantity = m.get(e, "Quantity")?.as_int().unwrap_or(0);
        Ok(Value::Int(price * quantity))
    }

    #[test]
    fn test_marks_property_calculated() {
        let (mut model, line, _) = totals();
        CalculatedRule::new("Total", product)
            .depends_on("Price,Quantity")
            .register(&mut model, line)
            .unwrap();

        let total = model.property(line, "Total").unwrap();
        assert!(model.property_meta(total).unwrap().is_calculated());
    }

    #[test]
    fn test_recalculates_on_dependency_change() {
        let (mut model, line, l) = totals();
        CalculatedRule::new("Total", product)
            .depends_on("Price,Quantity")
            .register(&mut model, line)
            .unwrap();

        model.set(l, "Price", 4).unwrap();
        model.set(l, "Quantity", 3).unwrap();
        assert_eq!(model.get(l, "Total").unwrap(), Value::Int(12));
    }

    #[test]
    fn test_failed_calculation_keeps_value() {
        let (mut model, line, l) = totals();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        CalculatedRule::new("Total", move |m, e| {
            counter.set(counter.get() + 1);
            match m.get(e, "Quantity")?.as_int() {
                Some(q) if q < 0 => Err(Error::rule("negative quantity")),
                _ => product(m, e),
            }
        })
        .depends_on("Price,Quantity")
        .register(&mut model, line)
        .unwrap();

        model.set(l, "Price", 2).unwrap();
        model.set(l, "Quantity", 5).unwrap();
        model.set(l, "Quantity", -1).unwrap();

        assert_eq!(model.get(l, "Total").unwrap(), Value::Int(10));
        assert_eq!(calls.get(), 3);
        assert!(!model.is_scope_active());
    }
}
