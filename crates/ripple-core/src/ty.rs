//! Type metadata: inheritance, declared properties and instance pools

use crate::events::TypeEvents;
use crate::format::Format;
use crate::identity::{EntityId, PropertyId, RuleId, TypeId};
use crate::observable::ObservableList;
use indexmap::IndexMap;

/// A named entity kind
///
/// Pools are keyed by the lower-cased object id. An instance of a derived
/// type is present in the pool of every ancestor as well, so a pool holds
/// the instances of this type and all of its subtypes.
#[derive(Debug)]
pub struct Type {
    pub(crate) id: TypeId,
    pub(crate) full_name: String,
    pub(crate) base_type: Option<TypeId>,
    pub(crate) derived_types: Vec<TypeId>,
    pub(crate) properties: IndexMap<String, PropertyId>,
    pub(crate) rules: Vec<RuleId>,
    pub(crate) pool: IndexMap<String, EntityId>,
    pub(crate) legacy_pool: IndexMap<String, EntityId>,
    pub(crate) counter: u64,
    pub(crate) known: Option<ObservableList<EntityId>>,
    pub(crate) format: Option<Format>,
    pub(crate) events: TypeEvents,
}

impl Type {
    pub(crate) fn new(id: TypeId, full_name: String, base_type: Option<TypeId>) -> Self {
        Self {
            id,
            full_name,
            base_type,
            derived_types: Vec::new(),
            properties: IndexMap::new(),
            rules: Vec::new(),
            pool: IndexMap::new(),
            legacy_pool: IndexMap::new(),
            counter: 0,
            known: None,
            format: None,
            events: TypeEvents::default(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully-qualified name, e.g. `Directory.UserRef`
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Last dotted segment of the full name
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit('.')
            .next()
            .unwrap_or(self.full_name.as_str())
    }

    pub fn base_type(&self) -> Option<TypeId> {
        self.base_type
    }

    pub fn derived_types(&self) -> &[TypeId] {
        &self.derived_types
    }

    /// Properties declared directly on this type, in declaration order
    pub fn declared_properties(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.properties.values().copied()
    }

    /// Rules whose root type is this type, in registration order
    pub fn rules(&self) -> &[RuleId] {
        &self.rules
    }

    /// Current value of the id counter shared with the inheritance chain
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Number of registered instances of this type and its subtypes
    pub fn instance_count(&self) -> usize {
        self.pool.len()
    }

    /// The default display format of instances, if set
    pub fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    pub fn events(&self) -> &TypeEvents {
        &self.events
    }
}
