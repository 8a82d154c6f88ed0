//! End-to-end behavior of types, scopes and rules working together

use crate::{
    CalculatedRule, EntityId, Model, ModelConfig, PropertyDef, Rule, RuleId, RuleOptions, Result,
    TypeId, ValidationRule, Value, ValueMap, ValueType,
};
use std::cell::Cell;
use std::rc::Rc;

fn props(pairs: &[(&str, Value)]) -> ValueMap {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn user_ref(model: &mut Model) -> TypeId {
    let user = model.define_type("Directory.UserRef", None).unwrap();
    for name in ["FirstName", "LastName", "FullName"] {
        model
            .add_property(user, PropertyDef::new(name, ValueType::String))
            .unwrap();
    }
    CalculatedRule::new("FullName", |m, e| {
        Ok(m.to_string(e, "[FirstName] [LastName]")?.into())
    })
    .depends_on("{FirstName,LastName}")
    .register(model, user)
    .unwrap();
    model.set_type_format(user, "[FullName]").unwrap();
    user
}

struct CountingRule(Rc<Cell<usize>>);

impl Rule for CountingRule {
    fn execute(&self, _: &mut Model, _: RuleId, _: EntityId) -> Result<()> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

#[test]
fn test_user_ref_full_name() {
    let mut model = Model::new();
    let user = user_ref(&mut model);

    let u = model
        .create(
            user,
            props(&[("FirstName", "Dave".into()), ("LastName", "Smith".into())]),
        )
        .unwrap();
    assert_eq!(model.get(u, "FullName").unwrap(), Value::from("Dave Smith"));

    model.set(u, "FirstName", "Bob").unwrap();
    assert_eq!(model.get(u, "FullName").unwrap(), Value::from("Bob Smith"));
    assert_eq!(model.display(u).unwrap(), "Bob Smith");
    assert!(!model.is_scope_active());
}

#[test]
fn test_depends_on_recomputes_once_per_perform() {
    let mut model = Model::new();
    let ty = model.define_type("Pair", None).unwrap();
    for name in ["A", "B", "Sum"] {
        model
            .add_property(ty, PropertyDef::new(name, ValueType::Int))
            .unwrap();
    }
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    CalculatedRule::new("Sum", move |m, e| {
        counter.set(counter.get() + 1);
        let a = m.get(e, "A")?.as_int().unwrap_or(0);
        let b = m.get(e, "B")?.as_int().unwrap_or(0);
        Ok(Value::Int(a + b))
    })
    .depends_on("A,B")
    .on_init(false)
    .register(&mut model, ty)
    .unwrap();
    let e = model.register(ty, Some("p"), false).unwrap();

    model
        .perform(|m| {
            m.set(e, "A", 1)?;
            m.set(e, "B", 2)
        })
        .unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(model.get(e, "Sum").unwrap(), Value::Int(3));

    model
        .perform(|m| {
            m.set(e, "A", 1)?;
            m.set(e, "B", 2)
        })
        .unwrap();
    assert_eq!(runs.get(), 1, "setting current values must not recompute");
}

#[test]
fn test_nested_perform_defers_rules_to_outermost_exit() {
    let mut model = Model::new();
    let ty = model.define_type("Thing", None).unwrap();
    model
        .add_property(ty, PropertyDef::new("A", ValueType::Int))
        .unwrap();
    let runs = Rc::new(Cell::new(0));
    model
        .register_rule(
            ty,
            RuleOptions::new().on_change_of("A"),
            CountingRule(Rc::clone(&runs)),
        )
        .unwrap();
    let e = model.register(ty, Some("t"), false).unwrap();

    model
        .perform(|m| {
            m.perform(|m| m.set(e, "A", 1))?;
            assert_eq!(runs.get(), 0, "rule fired inside the outer scope");
            m.perform(|m| m.set(e, "A", 2))?;
            assert_eq!(runs.get(), 0);
            Ok::<_, crate::Error>(())
        })
        .unwrap();

    assert_eq!(runs.get(), 1);
}

#[test]
fn test_cycle_stops_at_ceiling() {
    let config = ModelConfig::new().with_max_resolution_passes(10).unwrap();
    let mut model = Model::with_config(config);
    let ty = model.define_type("Loop", None).unwrap();
    for name in ["A", "B"] {
        model
            .add_property(ty, PropertyDef::new(name, ValueType::Int))
            .unwrap();
    }
    let e = model.register(ty, Some("l"), false).unwrap();

    let plus_one = |source: &'static str| {
        move |m: &Model, e: EntityId| -> Result<Value> {
            Ok(Value::Int(m.get(e, source)?.as_int().unwrap_or(0) + 1))
        }
    };
    CalculatedRule::new("B", plus_one("A"))
        .depends_on("A")
        .register(&mut model, ty)
        .unwrap();
    CalculatedRule::new("A", plus_one("B"))
        .depends_on("B")
        .register(&mut model, ty)
        .unwrap();

    model.set(e, "A", 1).unwrap();

    assert_eq!(model.aborted_resolutions(), 1);
    assert_eq!(model.get(e, "A").unwrap(), Value::Int(11));
    assert_eq!(model.get(e, "B").unwrap(), Value::Int(10));
    assert!(!model.is_scope_active());

    // the model stays usable after an aborted resolution
    model.set_max_resolution_passes(1).unwrap();
    model.set(e, "A", 100).unwrap();
    assert_eq!(model.get(e, "B").unwrap(), Value::Int(101));
    assert_eq!(model.aborted_resolutions(), 2);
}

#[test]
fn test_cascade_through_related_entity() {
    let mut model = Model::new();
    let user = user_ref(&mut model);
    let account = model.define_type("Directory.Account", None).unwrap();
    model
        .add_property(account, PropertyDef::new("Owner", ValueType::Entity(user)))
        .unwrap();
    model
        .add_property(account, PropertyDef::new("Title", ValueType::String))
        .unwrap();
    CalculatedRule::new("Title", |m, e| {
        Ok(m.to_string(e, "Account of [Owner]")?.into())
    })
    .depends_on("Owner.FullName")
    .register(&mut model, account)
    .unwrap();

    let owner = model
        .create(
            user,
            props(&[("FirstName", "Dave".into()), ("LastName", "Smith".into())]),
        )
        .unwrap();
    let a = model
        .create(account, props(&[("Owner", owner.into())]))
        .unwrap();
    assert_eq!(
        model.get(a, "Title").unwrap(),
        Value::from("Account of Dave Smith")
    );

    model.set(owner, "LastName", "Jones").unwrap();
    assert_eq!(
        model.get(a, "Title").unwrap(),
        Value::from("Account of Dave Jones")
    );
}

#[test]
fn test_label_dependencies_retrigger_validation() {
    let mut model = Model::new();
    let person = model.define_type("Person", None).unwrap();
    model
        .add_property(person, PropertyDef::new("FirstName", ValueType::String))
        .unwrap();
    let phone = model
        .add_property(
            person,
            PropertyDef::new("Phone", ValueType::String).label("[FirstName]'s phone"),
        )
        .unwrap();
    let rule = ValidationRule::required("Phone")
        .register(&mut model, person)
        .unwrap();

    let p = model
        .create(person, props(&[("FirstName", "Ada".into())]))
        .unwrap();
    assert_eq!(
        model.condition(p, rule).unwrap().message(),
        "Ada's phone is required."
    );

    model.set(p, "FirstName", "Bob").unwrap();
    assert_eq!(
        model.condition(p, rule).unwrap().message(),
        "Bob's phone is required."
    );
    assert_eq!(model.property_conditions(p, phone).unwrap().len(), 1);

    model.set(p, "Phone", "555-0100").unwrap();
    assert!(model.conditions(p).unwrap().is_empty());
}

#[test]
fn test_label_source_follows_related_entity() {
    let mut model = Model::new();
    let person = model.define_type("Person", None).unwrap();
    model
        .add_property(person, PropertyDef::new("FirstName", ValueType::String))
        .unwrap();
    let contact = model.define_type("Contact", None).unwrap();
    model
        .add_property(contact, PropertyDef::new("Owner", ValueType::Entity(person)))
        .unwrap();
    model
        .add_property(
            contact,
            PropertyDef::new("Phone", ValueType::String)
                .label("[FirstName]'s phone")
                .label_source("Owner"),
        )
        .unwrap();
    let rule = ValidationRule::required("Phone")
        .register(&mut model, contact)
        .unwrap();

    let owner = model
        .create(person, props(&[("FirstName", "Ada".into())]))
        .unwrap();
    let c = model.register(contact, Some("c1"), false).unwrap();

    model.set(c, "Owner", owner).unwrap();
    assert_eq!(
        model.condition(c, rule).unwrap().message(),
        "Ada's phone is required."
    );

    model.set(owner, "FirstName", "Zed").unwrap();
    assert_eq!(
        model.condition(c, rule).unwrap().message(),
        "Zed's phone is required."
    );

    model.set(c, "Owner", Value::Null).unwrap();
    assert_eq!(
        model.condition(c, rule).unwrap().message(),
        "Phone is required."
    );
}

#[test]
fn test_failing_rule_does_not_stop_resolution() {
    struct Failing;
    impl Rule for Failing {
        fn execute(&self, _: &mut Model, _: RuleId, _: EntityId) -> Result<()> {
            Err(crate::Error::rule("always fails"))
        }
    }
    struct Panicking;
    impl Rule for Panicking {
        fn execute(&self, _: &mut Model, _: RuleId, _: EntityId) -> Result<()> {
            panic!("rule bug")
        }
    }

    let mut model = Model::new();
    let ty = model.define_type("Thing", None).unwrap();
    model
        .add_property(ty, PropertyDef::new("A", ValueType::Int))
        .unwrap();
    let runs = Rc::new(Cell::new(0));
    let on_a = || RuleOptions::new().on_change_of("A");
    model.register_rule(ty, on_a(), Failing).unwrap();
    model.register_rule(ty, on_a(), Panicking).unwrap();
    model
        .register_rule(ty, on_a(), CountingRule(Rc::clone(&runs)))
        .unwrap();
    let e = model.register(ty, Some("t"), false).unwrap();

    model.set(e, "A", 1).unwrap();

    assert_eq!(runs.get(), 1);
    assert_eq!(model.scope_depth(), 0);
}

#[test]
fn test_independent_models_do_not_interact() {
    let mut first = Model::new();
    let mut second = Model::new();
    let a = user_ref(&mut first);
    let b = user_ref(&mut second);

    first
        .perform(|m| {
            assert!(!second.is_scope_active());
            m.create(a, ValueMap::new())
        })
        .unwrap();
    assert_eq!(second.new_id(b).unwrap(), "+c0");
}
