//! Validation rules: conditions about a single property's value

use super::condition::{AssertFn, ConditionType, Message, Severity};
use super::{Rule, RuleOptions};
use crate::error::{Error, Result};
use crate::identity::{EntityId, PropertyId, RuleId, TypeId};
use crate::model::Model;
use crate::property::{humanize, Property};
use crate::value::Value;
use std::fmt;
use std::rc::Rc;
use tracing::warn;

pub type IsValidFn = Rc<dyn Fn(&Model, EntityId, &Property, &Value) -> Result<bool>>;

const PROPERTY_PLACEHOLDER: &str = "{property}";

#[derive(Clone)]
enum Check {
    IsValid(IsValidFn),
    Assert(AssertFn),
}

/// Builder for a rule that flags an invalid property value
///
/// The validated property is always part of the rule's triggers and of the
/// properties the resulting condition is attached to. `{property}` in the
/// message is replaced by the property's label; when the label is itself a
/// format, the properties it reads become triggers as well.
#[derive(Clone)]
pub struct ValidationRule {
    property: String,
    check: Option<Check>,
    message: Option<Message>,
    category: Severity,
    code: Option<String>,
    options: RuleOptions,
}

impl ValidationRule {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            check: None,
            message: None,
            category: Severity::Error,
            code: None,
            options: RuleOptions::new(),
        }
    }

    /// A value is required: not null, not blank text, not an empty list
    pub fn required(property: impl Into<String>) -> Self {
        Self::new(property)
            .name("Required")
            .message("{property} is required.")
            .is_valid(|_, _, _, value| {
                Ok(match value {
                    Value::Null => false,
                    Value::String(text) => !text.trim().is_empty(),
                    Value::List(items) => !items.is_empty(),
                    _ => true,
                })
            })
    }

    /// Text length (in characters) must lie within the given bounds; null passes
    pub fn string_length(
        property: impl Into<String>,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Self {
        let message = match (min, max) {
            (Some(min), Some(max)) => {
                format!("{{property}} must be between {min} and {max} characters.")
            }
            (Some(min), None) => format!("{{property}} must be at least {min} characters."),
            (None, Some(max)) => format!("{{property}} must be at most {max} characters."),
            (None, None) => "{property} is invalid.".to_string(),
        };

        Self::new(property)
            .name("StringLength")
            .message(message)
            .is_valid(move |_, _, _, value| {
                let Value::String(text) = value else {
                    return Ok(true);
                };
                let len = text.chars().count();
                Ok(min.map_or(true, |min| len >= min) && max.map_or(true, |max| len <= max))
            })
    }

    /// Predicate over the property value; `false` attaches the condition
    pub fn is_valid(
        mut self,
        f: impl Fn(&Model, EntityId, &Property, &Value) -> Result<bool> + 'static,
    ) -> Self {
        self.check = Some(Check::IsValid(Rc::new(f)));
        self
    }

    /// Assertion over the entity; `true` attaches the condition
    pub fn assert(mut self, f: impl Fn(&Model, EntityId) -> Result<bool> + 'static) -> Self {
        self.check = Some(Check::Assert(Rc::new(f)));
        self
    }

    pub fn message(mut self, message: impl Into<Message>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn category(mut self, category: Severity) -> Self {
        self.category = category;
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options = self.options.name(name);
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

    /// Register against `root`, which must expose the validated property
    pub fn register(self, model: &mut Model, root: TypeId) -> Result<RuleId> {
        let property = model.property(root, &self.property).ok_or_else(|| {
            Error::PropertyNotFound(format!("{}.{}", model.type_name(root), self.property))
        })?;
        let check = self.check.ok_or_else(|| {
            Error::InvalidRule(format!(
                "validation of '{}' needs an is_valid or assert function",
                self.property
            ))
        })?;

        let meta = model.property_ref(property)?;
        let label_paths: Vec<String> = match meta.label_format() {
            Some(format) => format
                .paths()
                .map(|token| match meta.label_source() {
                    Some(source) => format!("{source}.{token}"),
                    None => token.to_string(),
                })
                .collect(),
            None => Vec::new(),
        };

        let mut options = self
            .options
            .on_change_of(self.property.clone())
            .properties(self.property.clone());
        for path in label_paths {
            options = options.on_change_of(path);
        }

        let template = self
            .message
            .unwrap_or_else(|| Message::from("{property} is invalid."));
        let body = ValidatedProperty {
            property,
            check,
            condition_type: ConditionType {
                code: self
                    .code
                    .unwrap_or_else(|| format!("{}.{}", model.type_name(root), self.property)),
                category: self.category,
                message: Message::dynamic(move |m, e| {
                    let text = template.render(m, e)?;
                    if !text.contains(PROPERTY_PLACEHOLDER) {
                        return Ok(text);
                    }
                    let label = property_label(m, e, m.property_ref(property)?)?;
                    Ok(text.replace(PROPERTY_PLACEHOLDER, &label))
                }),
            },
        };

        model.add_rule(root, options, Rc::new(body))
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("property", &self.property)
            .field("message", &self.message)
            .field("category", &self.category)
            .field("code", &self.code)
            .field("options", &self.options)
            .finish()
    }
}

/// Evaluate a property's label for an entity
///
/// A formatted label with a label source is evaluated against the related
/// entity; when that entity is missing the humanized property name is used.
fn property_label(model: &Model, entity: EntityId, property: &Property) -> Result<String> {
    let Some(format) = property.label_format() else {
        return Ok(property.label().to_string());
    };
    let Some(source) = property.label_source() else {
        return format.evaluate(model, entity);
    };

    let mut target = entity;
    for step in source.split('.') {
        match model.get(target, step.trim())? {
            Value::Entity(related) => target = related,
            _ => return Ok(humanize(property.name())),
        }
    }
    format.evaluate(model, target)
}

struct ValidatedProperty {
    property: PropertyId,
    check: Check,
    condition_type: ConditionType,
}

impl Rule for ValidatedProperty {
    fn execute(&self, model: &mut Model, rule: RuleId, entity: EntityId) -> Result<()> {
        let verdict = match &self.check {
            Check::IsValid(is_valid) => {
                let meta = model.property_ref(self.property)?;
                let value = model.peek(entity, self.property).unwrap_or(Value::Null);
                is_valid(model, entity, meta, &value).map(|valid| !valid)
            }
            Check::Assert(assert) => assert(model, entity),
        };

        match verdict {
            Ok(present) => self.condition_type.apply(model, rule, entity, present),
            Err(err) => warn!(
                code = %self.condition_type.code,
                %entity,
                error = %err,
                "validation could not be evaluated, leaving condition unchanged"
            ),
        }
        Ok(())
    }

    fn default_name(&self) -> &str {
        "ValidatedProperty"
    }
}
