//! Rules: behavior bound to property changes
//!
//! A rule belongs to a root type and lists the property paths that trigger
//! it. When the enclosing scope resolves, each triggered rule runs once per
//! affected root entity. Three kinds are provided:
//!
//! - [`ConditionRule`] - attaches or clears a [`Condition`] from an assertion
//! - [`ValidationRule`] - a condition about one property's value
//! - [`CalculatedRule`] - assigns a property from other properties
//!
//! Anything else implements [`Rule`] and is added with
//! [`Model::register_rule`].

mod calculated;
mod condition;
mod validation;

pub use calculated::{CalculateFn, CalculatedRule};
pub use condition::{AssertFn, Condition, ConditionRule, ConditionType, Message, MessageFn, Severity};
pub use validation::{IsValidFn, ValidationRule};

use crate::error::{Error, Result};
use crate::identity::{EntityId, PropertyId, RuleId, TypeId};
use crate::model::Model;
use crate::path::PropertyPath;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Executable body of a rule
pub trait Rule {
    /// Run the rule for one root entity
    ///
    /// Runs inside its own nested scope; writes made here are resolved as
    /// the next generation. An `Err` is logged and does not stop resolution.
    fn execute(&self, model: &mut Model, rule: RuleId, entity: EntityId) -> Result<()>;

    /// Name used when the registration does not give one
    fn default_name(&self) -> &str {
        "Rule"
    }
}

/// Registration options for a rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOptions {
    pub(crate) name: Option<String>,
    pub(crate) on_change_of: Vec<String>,
    pub(crate) properties: Vec<String>,
    pub(crate) on_init: bool,
}

impl RuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add trigger paths, e.g. `"FirstName,LastName"` or `"Owner{Name}"`
    pub fn on_change_of(mut self, expression: impl Into<String>) -> Self {
        self.on_change_of.push(expression.into());
        self
    }

    /// Add properties of the root type the rule's outcome concerns
    pub fn properties(mut self, expression: impl Into<String>) -> Self {
        self.properties.push(expression.into());
        self
    }

    /// Also run for entities constructed while the rule is registered
    pub fn on_init(mut self, on_init: bool) -> Self {
        self.on_init = on_init;
        self
    }
}

/// A registered rule
pub struct RuleRecord {
    pub(crate) id: RuleId,
    pub(crate) root_type: TypeId,
    pub(crate) name: String,
    pub(crate) triggers: Vec<PropertyPath>,
    pub(crate) predicates: Vec<PropertyId>,
    pub(crate) on_init: bool,
    pub(crate) body: Rc<dyn Rule>,
}

impl RuleRecord {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn root_type(&self) -> TypeId {
        self.root_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distinct trigger paths, in declaration order
    pub fn triggers(&self) -> &[PropertyPath] {
        &self.triggers
    }

    /// Properties of the root type the rule's outcome is attached to
    pub fn predicates(&self) -> &[PropertyId] {
        &self.predicates
    }

    pub fn on_init(&self) -> bool {
        self.on_init
    }
}

impl fmt::Debug for RuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRecord")
            .field("id", &self.id)
            .field("root_type", &self.root_type)
            .field("name", &self.name)
            .field(
                "triggers",
                &self.triggers.iter().map(PropertyPath::expression).collect::<Vec<_>>(),
            )
            .field("predicates", &self.predicates)
            .field("on_init", &self.on_init)
            .finish()
    }
}

impl Model {
    /// Register a rule against a root type
    ///
    /// Trigger paths are resolved and deduplicated, and the rule is attached
    /// once to every property that appears on any of them.
    pub fn register_rule(
        &mut self,
        root: TypeId,
        options: RuleOptions,
        rule: impl Rule + 'static,
    ) -> Result<RuleId> {
        self.add_rule(root, options, Rc::new(rule))
    }

    /// Look up a registered rule
    pub fn rule(&self, rule: RuleId) -> Option<&RuleRecord> {
        self.rules.get(rule.index())
    }

    pub(crate) fn add_rule(
        &mut self,
        root: TypeId,
        options: RuleOptions,
        body: Rc<dyn Rule>,
    ) -> Result<RuleId> {
        self.type_ref(root)?;

        let mut triggers: Vec<PropertyPath> = Vec::new();
        for expression in &options.on_change_of {
            for path in self.resolve_paths(root, expression)? {
                if !triggers.contains(&path) {
                    triggers.push(path);
                }
            }
        }

        let mut predicates = Vec::new();
        for expression in &options.properties {
            for path in self.resolve_paths(root, expression)? {
                let [property] = path.steps() else {
                    return Err(Error::InvalidRule(format!(
                        "'{}' is not a property of '{}'",
                        path.expression(),
                        self.type_name(root)
                    )));
                };
                if !predicates.contains(property) {
                    predicates.push(*property);
                }
            }
        }

        let id = RuleId(self.rules.len() as u32);
        let name = options
            .name
            .unwrap_or_else(|| body.default_name().to_string());

        for path in &triggers {
            for step in path.steps() {
                self.properties[step.index()].add_rule(id);
            }
        }
        self.types[root.index()].rules.push(id);

        debug!(
            rule = %name,
            type_name = self.type_name(root),
            triggers = triggers.len(),
            "rule registered"
        );
        self.rules.push(RuleRecord {
            id,
            root_type: root,
            name,
            triggers,
            predicates,
            on_init: options.on_init,
            body,
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyDef;
    use crate::value::ValueType;
    use std::cell::RefCell;

    struct Recorder(Rc<RefCell<Vec<(RuleId, EntityId)>>>);

    impl Rule for Recorder {
        fn execute(&self, _: &mut Model, rule: RuleId, entity: EntityId) -> Result<()> {
            self.0.borrow_mut().push((rule, entity));
            Ok(())
        }
    }

    fn model() -> (Model, TypeId, TypeId) {
        let mut model = Model::new();
        let user = model.define_type("UserRef", None).unwrap();
        let contact = model.define_type("Contact", None).unwrap();
        for name in ["FirstName", "LastName"] {
            model
                .add_property(user, PropertyDef::new(name, ValueType::String))
                .unwrap();
        }
        model
            .add_property(contact, PropertyDef::new("Owner", ValueType::Entity(user)))
            .unwrap();
        (model, user, contact)
    }

    #[test]
    fn test_rule_attached_once_per_property() {
        let (mut model, user, _) = model();
        let log = Rc::new(RefCell::new(Vec::new()));
        let rule = model
            .register_rule(
                user,
                RuleOptions::new()
                    .on_change_of("FirstName,LastName")
                    .on_change_of("{FirstName}"),
                Recorder(Rc::clone(&log)),
            )
            .unwrap();

        let record = model.rule(rule).unwrap();
        assert_eq!(record.name(), "Rule");
        assert_eq!(record.triggers().len(), 2);

        let first = model.property(user, "FirstName").unwrap();
        assert_eq!(model.property_meta(first).unwrap().rules(), &[rule]);
    }

    #[test]
    fn test_fires_once_per_entity_per_generation() {
        let (mut model, user, _) = model();
        let log = Rc::new(RefCell::new(Vec::new()));
        let rule = model
            .register_rule(
                user,
                RuleOptions::new().on_change_of("FirstName,LastName"),
                Recorder(Rc::clone(&log)),
            )
            .unwrap();
        let u = model.register(user, Some("u1"), false).unwrap();

        model
            .perform(|m| {
                m.set(u, "FirstName", "Ada")?;
                m.set(u, "LastName", "Lovelace")
            })
            .unwrap();

        assert_eq!(*log.borrow(), vec![(rule, u)]);
    }

    #[test]
    fn test_related_path_runs_for_referencing_root() {
        let (mut model, user, contact) = model();
        let log = Rc::new(RefCell::new(Vec::new()));
        let rule = model
            .register_rule(
                contact,
                RuleOptions::new().on_change_of("Owner.FirstName"),
                Recorder(Rc::clone(&log)),
            )
            .unwrap();

        let owner = model.register(user, Some("u1"), false).unwrap();
        let other = model.register(user, Some("u2"), false).unwrap();
        let c = model.register(contact, Some("c1"), false).unwrap();
        model.set(c, "Owner", owner).unwrap();
        assert_eq!(*log.borrow(), vec![(rule, c)], "changing Owner triggers too");

        log.borrow_mut().clear();
        model.set(other, "FirstName", "Eve").unwrap();
        assert!(log.borrow().is_empty());

        model.set(owner, "FirstName", "Ada").unwrap();
        assert_eq!(*log.borrow(), vec![(rule, c)]);
    }

    #[test]
    fn test_invalid_registrations() {
        let (mut model, user, contact) = model();
        let log = Rc::new(RefCell::new(Vec::new()));
        assert!(matches!(
            model.register_rule(
                user,
                RuleOptions::new().on_change_of("Missing"),
                Recorder(Rc::clone(&log))
            ),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            model.register_rule(
                contact,
                RuleOptions::new().properties("Owner.FirstName"),
                Recorder(Rc::clone(&log))
            ),
            Err(Error::InvalidRule(_))
        ));
    }
}
