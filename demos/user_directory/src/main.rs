//! User directory demo
//!
//! Builds a small directory model, shows calculated properties and
//! validation reacting to edits, and prints the JSON form of an entry.
//!
//! Run with `RUST_LOG=ripple_core=debug` to watch the engine work.

use ripple_core::{
    CalculatedRule, Model, ModelEvent, PropertyDef, Severity, ValidationRule, Value, ValueMap,
    ValueType,
};
use ripple_serde::{EntitySerializer, PropertyInjector, SerializedProperty};
use tracing::info;
use tracing_subscriber::EnvFilter;

struct ObjectId;

impl PropertyInjector for ObjectId {
    fn inject(&self, model: &Model, entity: ripple_core::EntityId) -> Vec<SerializedProperty> {
        model
            .entity(entity)
            .map(|e| vec![SerializedProperty::new("$id", e.id())])
            .unwrap_or_default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut model = Model::new();
    model.on_event(|event| {
        if let ModelEvent::ConditionChanged { present, .. } = event {
            info!(present, "condition changed");
        }
    });

    let user = model.define_type("Directory.UserRef", None)?;
    for name in ["Id", "FirstName", "LastName", "FullName"] {
        model.add_property(user, PropertyDef::new(name, ValueType::String))?;
    }
    model.add_property(
        user,
        PropertyDef::new("Email", ValueType::String).label("[FirstName]'s email"),
    )?;
    model.set_type_format(user, "[FullName]")?;

    CalculatedRule::new("FullName", |m, e| {
        Ok(m.to_string(e, "[FirstName] [LastName]")?.trim().to_string().into())
    })
    .depends_on("{FirstName,LastName}")
    .register(&mut model, user)?;
    let email_required = ValidationRule::required("Email").register(&mut model, user)?;
    ValidationRule::string_length("Id", Some(3), Some(12))
        .category(Severity::Warning)
        .register(&mut model, user)?;

    let mut props = ValueMap::new();
    props.insert("FirstName".to_string(), Value::from("Dave"));
    props.insert("LastName".to_string(), Value::from("Smith"));
    props.insert("Id".to_string(), Value::from("ds"));
    let dave = model.create(user, props)?;
    println!("created {} ({})", model.display(dave)?, model.entity(dave).map_or("", |e| e.id()));

    model.set(dave, "FirstName", "Bob")?;
    println!("renamed to {}", model.get(dave, "FullName")?);

    for condition in model.conditions(dave)? {
        println!("  {:?}: {}", condition.category(), condition.message());
    }

    model.perform(|m| {
        m.set(dave, "Email", "bob@example.com")?;
        m.set(dave, "Id", "bsmith")
    })?;
    println!(
        "email condition present: {}",
        model.condition(dave, email_required).is_some()
    );

    let fresh_id = model.entity(dave).map(|e| e.id().to_string()).unwrap_or_default();
    model.change_object_id(user, &fresh_id, "1001")?;

    let mut serializer = EntitySerializer::new();
    serializer.register_property_injector(user, ObjectId);
    println!("{}", serializer.to_string_pretty(&model, dave, false)?);

    Ok(())
}
