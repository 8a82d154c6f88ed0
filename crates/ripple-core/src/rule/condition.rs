//! Conditions: rule outcomes attached to entities

use super::{Rule, RuleOptions};
use crate::error::Result;
use crate::identity::{EntityId, PropertyId, RuleId, TypeId};
use crate::model::Model;
use std::fmt;
use std::rc::Rc;
use tracing::warn;

/// How serious a condition is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Information,
}

/// A condition present on an entity
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub(crate) rule: RuleId,
    pub(crate) code: String,
    pub(crate) category: Severity,
    pub(crate) message: String,
    pub(crate) properties: Vec<PropertyId>,
}

impl Condition {
    /// The rule that produced the condition
    pub fn rule(&self) -> RuleId {
        self.rule
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn category(&self) -> Severity {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Properties the condition is attached to
    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }
}

pub type MessageFn = Rc<dyn Fn(&Model, EntityId) -> Result<String>>;
pub type AssertFn = Rc<dyn Fn(&Model, EntityId) -> Result<bool>>;

/// Condition message, either fixed or computed from the entity
#[derive(Clone)]
pub enum Message {
    Static(String),
    Dynamic(MessageFn),
}

impl Message {
    pub fn dynamic(f: impl Fn(&Model, EntityId) -> Result<String> + 'static) -> Self {
        Message::Dynamic(Rc::new(f))
    }

    pub(crate) fn render(&self, model: &Model, entity: EntityId) -> Result<String> {
        match self {
            Message::Static(text) => Ok(text.clone()),
            Message::Dynamic(f) => f(model, entity),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Message::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Static(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Static(text)
    }
}

/// The kind of condition a rule produces
#[derive(Debug, Clone)]
pub struct ConditionType {
    pub code: String,
    pub category: Severity,
    pub message: Message,
}

impl ConditionType {
    pub fn new(code: impl Into<String>, message: impl Into<Message>) -> Self {
        Self {
            code: code.into(),
            category: Severity::default(),
            message: message.into(),
        }
    }

    /// Attach, replace or clear this condition on `entity`
    ///
    /// When the message cannot be rendered, a condition already present keeps
    /// its previous message.
    pub(crate) fn apply(&self, model: &mut Model, rule: RuleId, entity: EntityId, present: bool) {
        if !present {
            model.clear_condition(entity, rule);
            return;
        }

        let message = match self.message.render(model, entity) {
            Ok(message) => message,
            Err(err) => {
                warn!(code = %self.code, %entity, error = %err, "condition message could not be evaluated");
                match model.condition(entity, rule) {
                    Some(previous) => previous.message.clone(),
                    None => self.code.clone(),
                }
            }
        };
        let properties = model
            .rule(rule)
            .map(|r| r.predicates.clone())
            .unwrap_or_default();

        model.set_condition(
            entity,
            Condition {
                rule,
                code: self.code.clone(),
                category: self.category,
                message,
                properties,
            },
        );
    }
}

/// Attaches a condition while an assertion holds
///
/// An assertion that fails with an error is indeterminate: the condition is
/// left as it was.
#[derive(Clone)]
pub struct ConditionRule {
    condition_type: ConditionType,
    assert: AssertFn,
    options: RuleOptions,
}

impl ConditionRule {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<Message>,
        assert: impl Fn(&Model, EntityId) -> Result<bool> + 'static,
    ) -> Self {
        Self {
            condition_type: ConditionType::new(code, message),
            assert: Rc::new(assert),
            options: RuleOptions::new(),
        }
    }

    pub fn category(mut self, category: Severity) -> Self {
        self.condition_type.category = category;
        self
    }

    pub fn on_change_of(mut self, expression: impl Into<String>) -> Self {
        self.options = self.options.on_change_of(expression);
        self
    }

    pub fn properties(mut self, expression: impl Into<String>) -> Self {
        self.options = self.options.properties(expression);
        self
    }

    pub fn on_init(mut self, on_init: bool) -> Self {
        self.options = self.options.on_init(on_init);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options = self.options.name(name);
        self
    }

    pub fn condition_type(&self) -> &ConditionType {
        &self.condition_type
    }

    pub fn register(self, model: &mut Model, root: TypeId) -> Result<RuleId> {
        let options = self.options.clone();
        model.add_rule(root, options, Rc::new(self))
    }
}

impl Rule for ConditionRule {
    fn execute(&self, model: &mut Model, rule: RuleId, entity: EntityId) -> Result<()> {
        match (self.assert)(model, entity) {
            Ok(present) => self.condition_type.apply(model, rule, entity, present),
            Err(err) => warn!(
                code = %self.condition_type.code,
                %entity,
                error = %err,
                "condition assertion failed, leaving condition unchanged"
            ),
        }
        Ok(())
    }

    fn default_name(&self) -> &str {
        "Condition"
    }
}

impl fmt::Debug for ConditionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionRule")
            .field("condition_type", &self.condition_type)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::events::ModelEvent;
    use crate::property::PropertyDef;
    use crate::value::{Value, ValueType};
    use std::cell::RefCell;

    fn order_model() -> (Model, TypeId, EntityId) {
        let mut model = Model::new();
        let order = model.define_type("Order", None).unwrap();
        model
            .add_property(order, PropertyDef::new("Quantity", ValueType::Int))
            .unwrap();
        let entity = model.register(order, Some("o1"), false).unwrap();
        (model, order, entity)
    }

    fn too_many(model: &Model, entity: EntityId) -> Result<bool> {
        Ok(model.get(entity, "Quantity")?.as_int().unwrap_or(0) > 10)
    }

    #[test]
    fn test_condition_follows_assertion() {
        let (mut model, order, o) = order_model();
        let rule = ConditionRule::new("TooMany", "Too many items", too_many)
            .category(Severity::Warning)
            .on_change_of("Quantity")
            .properties("Quantity")
            .register(&mut model, order)
            .unwrap();

        model.set(o, "Quantity", 50).unwrap();
        let condition = model.condition(o, rule).unwrap();
        assert_eq!(condition.message(), "Too many items");
        assert_eq!(condition.category(), Severity::Warning);
        let quantity = model.property(order, "Quantity").unwrap();
        assert_eq!(model.property_conditions(o, quantity).unwrap().len(), 1);

        model.set(o, "Quantity", 3).unwrap();
        assert!(model.conditions(o).unwrap().is_empty());
    }

    #[test]
    fn test_condition_events_only_on_presence_change() {
        let (mut model, order, o) = order_model();
        ConditionRule::new("TooMany", "Too many items", too_many)
            .on_change_of("Quantity")
            .register(&mut model, order)
            .unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        model.on_event(move |event| {
            if let ModelEvent::ConditionChanged { present, .. } = event {
                sink.borrow_mut().push(*present);
            }
        });

        for quantity in [20, 30, 1] {
            model.set(o, "Quantity", quantity).unwrap();
        }
        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    #[test]
    fn test_failing_assertion_is_indeterminate() {
        let (mut model, order, o) = order_model();
        let rule = ConditionRule::new("Odd", "Odd quantity", |m, e| {
            match m.get(e, "Quantity")? {
                Value::Int(n) if n < 0 => Err(Error::rule("negative quantity")),
                value => Ok(value.as_int().unwrap_or(0) % 2 == 1),
            }
        })
        .on_change_of("Quantity")
        .register(&mut model, order)
        .unwrap();

        model.set(o, "Quantity", 3).unwrap();
        assert!(model.condition(o, rule).is_some());
        model.set(o, "Quantity", -2).unwrap();
        assert!(model.condition(o, rule).is_some(), "state kept when assertion errors");
    }

    #[test]
    fn test_failing_message_keeps_previous_text() {
        let (mut model, order, o) = order_model();
        let rule = ConditionRule::new(
            "TooMany",
            Message::dynamic(|m, e| {
                let n = m.get(e, "Quantity")?.as_int().unwrap_or(0);
                if n > 100 {
                    return Err(Error::rule("unprintable"));
                }
                Ok(format!("{n} is too many"))
            }),
            too_many,
        )
        .on_change_of("Quantity")
        .register(&mut model, order)
        .unwrap();

        model.set(o, "Quantity", 11).unwrap();
        assert_eq!(model.condition(o, rule).unwrap().message(), "11 is too many");
        model.set(o, "Quantity", 500).unwrap();
        assert_eq!(model.condition(o, rule).unwrap().message(), "11 is too many");
    }
}
