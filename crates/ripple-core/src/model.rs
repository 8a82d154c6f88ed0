//! The model: type registry, entity arena and the active event scope

use crate::config::ModelConfig;
use crate::entity::{Entity, EntityMeta, Slot};
use crate::error::{Error, Result};
use crate::events::{Dispatcher, EntityInit, ModelEvent, Subscription};
use crate::format::Format;
use crate::identity::{EntityId, PropertyId, TypeId};
use crate::observable::{ListChange, ObservableList};
use crate::property::{Property, PropertyAccess, PropertyChange, PropertyDef};
use crate::rule::RuleRecord;
use crate::scope::EventScope;
use crate::ty::Type;
use crate::value::ValueMap;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace, warn};

/// A self-contained object model
///
/// Owns every type, property, rule and entity, plus the scope stack that
/// batches property changes. Independent models share nothing.
pub struct Model {
    pub(crate) config: ModelConfig,
    pub(crate) types: Vec<Type>,
    pub(crate) type_names: HashMap<String, TypeId>,
    pub(crate) properties: Vec<Property>,
    pub(crate) rules: Vec<RuleRecord>,
    pub(crate) entities: IndexMap<EntityId, Entity>,
    pub(crate) next_entity: u64,
    pub(crate) scope: EventScope,
    pub(crate) events: Dispatcher<ModelEvent>,
}

impl Model {
    /// Create an empty model with the default configuration
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }

    /// Create an empty model with a specific configuration
    pub fn with_config(config: ModelConfig) -> Self {
        Self {
            config,
            types: Vec::new(),
            type_names: HashMap::new(),
            properties: Vec::new(),
            rules: Vec::new(),
            entities: IndexMap::new(),
            next_entity: 0,
            scope: EventScope::default(),
            events: Dispatcher::new(),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Change the prefix used for generated ids
    pub fn set_new_id_prefix(&mut self, prefix: impl Into<String>) -> Result<()> {
        self.config.set_new_id_prefix(prefix)
    }

    /// Change the resolution ceiling
    pub fn set_max_resolution_passes(&mut self, passes: usize) -> Result<()> {
        self.config.set_max_resolution_passes(passes)
    }

    /// Subscribe to model-level notifications
    pub fn on_event(&mut self, handler: impl Fn(&ModelEvent) + 'static) -> Subscription {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe_event(&mut self, token: Subscription) -> bool {
        self.events.unsubscribe(token)
    }

    // Types

    /// Declare a type, optionally deriving from a base type
    pub fn define_type(&mut self, full_name: &str, base: Option<TypeId>) -> Result<TypeId> {
        if self.type_names.contains_key(full_name) {
            return Err(Error::DuplicateType(full_name.to_string()));
        }
        if let Some(base) = base {
            self.type_ref(base)?;
        }

        let id = TypeId(self.types.len() as u32);
        self.types.push(Type::new(id, full_name.to_string(), base));
        self.type_names.insert(full_name.to_string(), id);
        if let Some(base) = base {
            self.types[base.index()].derived_types.push(id);
        }

        debug!(type_name = full_name, "type defined");
        Ok(id)
    }

    /// Look up a type by full name
    pub fn type_by_name(&self, full_name: &str) -> Option<TypeId> {
        self.type_names.get(full_name).copied()
    }

    pub fn type_meta(&self, ty: TypeId) -> Option<&Type> {
        self.types.get(ty.index())
    }

    /// Full name of a type, or `"?"` for an unknown handle
    pub fn type_name(&self, ty: TypeId) -> &str {
        self.types
            .get(ty.index())
            .map_or("?", |t| t.full_name.as_str())
    }

    /// The type followed by each of its ancestors, most derived first
    pub fn chain(&self, ty: TypeId) -> Result<Vec<TypeId>> {
        let mut chain = vec![ty];
        let mut current = self.type_ref(ty)?.base_type;
        while let Some(base) = current {
            chain.push(base);
            current = self.type_ref(base)?.base_type;
        }
        Ok(chain)
    }

    /// Whether `ty` derives (directly or not) from `ancestor`; a type is not its own subclass
    pub fn is_subclass_of(&self, ty: TypeId, ancestor: TypeId) -> bool {
        ty != ancestor && self.is_same_or_subclass(ty, ancestor)
    }

    pub(crate) fn is_same_or_subclass(&self, ty: TypeId, ancestor: TypeId) -> bool {
        let mut current = Some(ty);
        while let Some(t) = current {
            if t == ancestor {
                return true;
            }
            current = self.types.get(t.index()).and_then(|t| t.base_type);
        }
        false
    }

    /// Whether an entity's runtime type is `ty` or one of its subtypes
    pub fn is_instance_of(&self, entity: EntityId, ty: TypeId) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|e| self.is_same_or_subclass(e.meta.type_id, ty))
    }

    /// Set the default display format of a type's instances
    pub fn set_type_format(&mut self, ty: TypeId, format: &str) -> Result<()> {
        let format = Format::parse(format)?;
        self.type_mut(ty)?.format = Some(format);
        Ok(())
    }

    /// Subscribe to construction of new instances of a type or its subtypes
    pub fn on_init_new(
        &mut self,
        ty: TypeId,
        handler: impl Fn(&EntityInit) + 'static,
    ) -> Result<Subscription> {
        Ok(self.type_mut(ty)?.events.init_new.subscribe(handler))
    }

    /// Subscribe to hydration of existing instances of a type or its subtypes
    pub fn on_init_existing(
        &mut self,
        ty: TypeId,
        handler: impl Fn(&EntityInit) + 'static,
    ) -> Result<Subscription> {
        Ok(self.type_mut(ty)?.events.init_existing.subscribe(handler))
    }

    /// Subscribe to properties being declared on a type
    pub fn on_property_added(
        &mut self,
        ty: TypeId,
        handler: impl Fn(&PropertyId) + 'static,
    ) -> Result<Subscription> {
        Ok(self.type_mut(ty)?.events.property_added.subscribe(handler))
    }

    // Identity

    /// Allocate a client-generated id unique across the inheritance chain
    pub fn new_id(&mut self, ty: TypeId) -> Result<String> {
        let chain = self.chain(ty)?;
        let max = chain
            .iter()
            .map(|t| self.types[t.index()].counter)
            .max()
            .unwrap_or(0);
        for t in &chain {
            self.types[t.index()].counter = max + 1;
        }
        Ok(self.config.format_new_id(max))
    }

    /// Register a new entity of `ty`
    ///
    /// With no id a new one is generated and the entity is flagged new.
    /// Ids are compared case-insensitively against the pools of the type and
    /// every ancestor; a clash fails before anything is modified.
    pub fn register(
        &mut self,
        ty: TypeId,
        id: Option<&str>,
        suppress_event: bool,
    ) -> Result<EntityId> {
        let chain = self.chain(ty)?;
        let (id, is_new) = match id {
            Some(id) => {
                self.validate_id(ty, id)?;
                (id.to_string(), self.config.is_new_id(id))
            }
            None => (self.new_id(ty)?, true),
        };

        let key = id.to_lowercase();
        if chain
            .iter()
            .any(|t| self.types[t.index()].pool.contains_key(&key))
        {
            return Err(Error::DuplicateRegistration {
                type_name: self.type_name(ty).to_string(),
                id,
            });
        }

        let handle = EntityId(self.next_entity);
        self.next_entity += 1;
        let slots = self.build_slots(&chain);
        self.entities.insert(
            handle,
            Entity {
                handle,
                meta: EntityMeta {
                    id: id.clone(),
                    is_new,
                    legacy_ids: Vec::new(),
                    type_id: ty,
                },
                slots,
                conditions: IndexMap::new(),
            },
        );

        // Supplied client ids reserve their counter so new_id never reissues them.
        let reserved = self.config.parse_new_id(&id).map(|n| n.saturating_add(1));
        for t in &chain {
            let Type {
                pool,
                known,
                counter,
                ..
            } = &mut self.types[t.index()];
            if let Some(reserved) = reserved {
                *counter = (*counter).max(reserved);
            }
            pool.insert(key.clone(), handle);
            if let Some(known) = known {
                known.push(handle);
            }
        }

        trace!(type_name = self.type_name(ty), id = %id, "entity registered");
        if !suppress_event {
            self.events.dispatch(&ModelEvent::EntityRegistered {
                entity: handle,
                type_id: ty,
            });
        }
        Ok(handle)
    }

    /// Re-key an entity, keeping the old id resolvable
    ///
    /// Returns `Ok(None)` (and logs a warning) when no entity has `old_id`.
    pub fn change_object_id(
        &mut self,
        ty: TypeId,
        old_id: &str,
        new_id: &str,
    ) -> Result<Option<EntityId>> {
        self.validate_id(ty, old_id)?;
        self.validate_id(ty, new_id)?;

        let old_key = old_id.to_lowercase();
        let new_key = new_id.to_lowercase();

        let Some(handle) = self.type_ref(ty)?.pool.get(&old_key).copied() else {
            warn!(
                type_name = self.type_name(ty),
                id = old_id,
                "attempted to change id of an instance that could not be found"
            );
            return Ok(None);
        };

        let chain = self.chain(self.entity_ref(handle)?.meta.type_id)?;
        let clash = chain.iter().any(|t| {
            self.types[t.index()]
                .pool
                .get(&new_key)
                .is_some_and(|other| *other != handle)
        });
        if clash {
            return Err(Error::DuplicateRegistration {
                type_name: self.type_name(ty).to_string(),
                id: new_id.to_string(),
            });
        }

        for t in &chain {
            let Type {
                pool, legacy_pool, ..
            } = &mut self.types[t.index()];
            pool.shift_remove(&old_key);
            pool.insert(new_key.clone(), handle);
            legacy_pool.insert(old_key.clone(), handle);
        }

        if let Some(entity) = self.entities.get_mut(&handle) {
            let previous = std::mem::replace(&mut entity.meta.id, new_id.to_string());
            entity.meta.legacy_ids.push(previous);
        }

        debug!(type_name = self.type_name(ty), old_id, new_id, "object id changed");
        Ok(Some(handle))
    }

    /// Remove an entity from every pool of its hierarchy and from the model
    pub fn unregister(&mut self, entity: EntityId) -> Result<()> {
        let data = self.entity_ref(entity)?;
        let type_id = data.meta.type_id;
        let key = data.meta.id.to_lowercase();
        let legacy_keys: Vec<String> = data
            .meta
            .legacy_ids
            .iter()
            .map(|id| id.to_lowercase())
            .collect();

        for t in self.chain(type_id)? {
            let Type {
                pool,
                legacy_pool,
                known,
                ..
            } = &mut self.types[t.index()];
            pool.shift_remove(&key);
            for legacy in &legacy_keys {
                legacy_pool.shift_remove(legacy);
            }
            if let Some(known) = known {
                known.remove(&entity);
            }
        }
        self.entities.shift_remove(&entity);

        trace!(type_name = self.type_name(type_id), id = %key, "entity unregistered");
        self.events
            .dispatch(&ModelEvent::EntityUnregistered { entity, type_id });
        Ok(())
    }

    /// Find an entity by object id, falling back to its former ids
    ///
    /// With `exact_type_only`, finding an instance of a strict subtype is a
    /// [`Error::TypeMismatch`].
    pub fn get_entity(
        &self,
        ty: TypeId,
        id: &str,
        exact_type_only: bool,
    ) -> Result<Option<EntityId>> {
        let t = self.type_ref(ty)?;
        let key = id.to_lowercase();
        let Some(handle) = t.pool.get(&key).or_else(|| t.legacy_pool.get(&key)).copied() else {
            return Ok(None);
        };

        if exact_type_only {
            let found = self.entity_ref(handle)?.meta.type_id;
            if found != ty {
                return Err(Error::TypeMismatch {
                    id: id.to_string(),
                    expected: self.type_name(ty).to_string(),
                    found: self.type_name(found).to_string(),
                });
            }
        }
        Ok(Some(handle))
    }

    /// Live list of the registered instances of a type (subtypes included)
    pub fn known(&mut self, ty: TypeId) -> Result<&ObservableList<EntityId>> {
        let Type { pool, known, .. } = self.type_mut(ty)?;
        let list = known.get_or_insert_with(|| ObservableList::new(pool.values().copied().collect()));
        Ok(&*list)
    }

    /// Subscribe to additions and removals in [`Model::known`]
    pub fn on_known_changed(
        &mut self,
        ty: TypeId,
        handler: impl Fn(&ListChange<EntityId>) + 'static,
    ) -> Result<Subscription> {
        self.known(ty)?;
        let known = self
            .type_mut(ty)?
            .known
            .as_mut()
            .ok_or_else(|| Error::TypeNotFound(ty.to_string()))?;
        Ok(known.subscribe(handler))
    }

    // Properties

    /// Declare a property on a type
    ///
    /// Entities already registered under the type gain the property at once,
    /// unless they already expose a property of that name.
    pub fn add_property(&mut self, ty: TypeId, def: PropertyDef) -> Result<PropertyId> {
        if self.type_ref(ty)?.properties.contains_key(&def.name) {
            return Err(Error::DuplicateProperty(format!(
                "{}.{}",
                self.type_name(ty),
                def.name
            )));
        }

        let id = PropertyId(self.properties.len() as u32);
        let property = Property::new(id, ty, def)?;
        let name = property.name.clone();
        let slot = if property.is_static {
            Slot::Static { property: id }
        } else {
            Slot::Instance {
                property: id,
                value: property.default_value(),
            }
        };
        self.properties.push(property);
        self.types[ty.index()].properties.insert(name.clone(), id);

        let members: Vec<EntityId> = self.types[ty.index()].pool.values().copied().collect();
        for handle in members {
            if let Some(entity) = self.entities.get_mut(&handle) {
                entity
                    .slots
                    .entry(name.clone())
                    .or_insert_with(|| slot.clone());
            }
        }

        debug!(type_name = self.type_name(ty), property = %name, "property added");
        self.types[ty.index()].events.property_added.dispatch(&id);
        self.events
            .dispatch(&ModelEvent::PropertyAdded { property: id, type_id: ty });
        Ok(id)
    }

    /// Find a property by name, walking from `ty` toward the root
    pub fn property(&self, ty: TypeId, name: &str) -> Option<PropertyId> {
        let mut current = Some(ty);
        while let Some(t) = current {
            let t = self.types.get(t.index())?;
            if let Some(id) = t.properties.get(name) {
                return Some(*id);
            }
            current = t.base_type;
        }
        None
    }

    pub fn property_meta(&self, property: PropertyId) -> Option<&Property> {
        self.properties.get(property.index())
    }

    /// Every property visible on `ty`, root type's declarations first
    ///
    /// A name declared again on a derived type is listed once, as the
    /// declaration nearest to `ty`.
    pub fn properties_of(&self, ty: TypeId) -> Result<Vec<PropertyId>> {
        let chain = self.chain(ty)?;
        let mut out = Vec::new();
        for t in chain.iter().rev() {
            for (name, id) in &self.types[t.index()].properties {
                if self.property(ty, name) == Some(*id) {
                    out.push(*id);
                }
            }
        }
        Ok(out)
    }

    /// Subscribe to resolved changes of a property, optionally for one entity
    pub fn on_property_changed(
        &mut self,
        property: PropertyId,
        entity: Option<EntityId>,
        handler: impl Fn(&PropertyChange) + 'static,
    ) -> Result<Subscription> {
        Ok(self.property_mut(property)?.on_changed(entity, handler))
    }

    /// Subscribe to reads of a property, optionally for one entity
    pub fn on_property_accessed(
        &mut self,
        property: PropertyId,
        entity: Option<EntityId>,
        handler: impl Fn(&PropertyAccess) + 'static,
    ) -> Result<Subscription> {
        Ok(self.property_mut(property)?.on_accessed(entity, handler))
    }

    // Entities

    pub fn entity(&self, entity: EntityId) -> Option<&Entity> {
        self.entities.get(&entity)
    }

    /// Number of registered entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Construct a new entity with a generated id
    ///
    /// `props` are written in one scope together with the rules that run on
    /// initialization. `init_new` is raised on the type and each base type.
    pub fn create(&mut self, ty: TypeId, props: ValueMap) -> Result<EntityId> {
        self.perform(|m| {
            let entity = m.register(ty, None, false)?;
            if let Err(err) = m.apply_props(entity, props) {
                m.unregister(entity)?;
                return Err(err);
            }
            m.initialize(ty, entity, true)?;
            Ok(entity)
        })
    }

    /// Materialize an entity that already has an id
    ///
    /// If an instance with that id is registered under exactly `ty`, `props`
    /// are applied to it and it is returned; otherwise a new instance is
    /// registered and `init_existing` is raised up the chain.
    pub fn hydrate(&mut self, ty: TypeId, id: &str, props: ValueMap) -> Result<EntityId> {
        self.validate_id(ty, id)?;
        self.perform(|m| {
            if let Some(existing) = m.get_entity(ty, id, true)? {
                m.apply_props(existing, props)?;
                return Ok(existing);
            }

            let entity = m.register(ty, Some(id), false)?;
            if let Err(err) = m.apply_props(entity, props) {
                m.unregister(entity)?;
                return Err(err);
            }
            m.initialize(ty, entity, false)?;
            Ok(entity)
        })
    }

    fn apply_props(&mut self, entity: EntityId, props: ValueMap) -> Result<()> {
        for (name, value) in props {
            self.set(entity, &name, value)?;
        }
        Ok(())
    }

    fn initialize(&mut self, ty: TypeId, entity: EntityId, is_new: bool) -> Result<()> {
        self.scope.record_init(entity);
        let args = EntityInit {
            entity,
            type_id: ty,
        };
        for t in self.chain(ty)? {
            let events = &self.types[t.index()].events;
            if is_new {
                events.init_new.dispatch(&args);
            } else {
                events.init_existing.dispatch(&args);
            }
        }
        Ok(())
    }

    fn build_slots(&self, chain: &[TypeId]) -> IndexMap<String, Slot> {
        let mut slots = IndexMap::new();
        for t in chain {
            for (name, id) in &self.types[t.index()].properties {
                if slots.contains_key(name) {
                    continue;
                }
                let property = &self.properties[id.index()];
                let slot = if property.is_static {
                    Slot::Static { property: *id }
                } else {
                    Slot::Instance {
                        property: *id,
                        value: property.default_value(),
                    }
                };
                slots.insert(name.clone(), slot);
            }
        }
        slots
    }

    fn validate_id(&self, ty: TypeId, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidId {
                type_name: self.type_name(ty).to_string(),
                reason: "id cannot be an empty string".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn type_ref(&self, ty: TypeId) -> Result<&Type> {
        self.types
            .get(ty.index())
            .ok_or_else(|| Error::TypeNotFound(ty.to_string()))
    }

    pub(crate) fn type_mut(&mut self, ty: TypeId) -> Result<&mut Type> {
        self.types
            .get_mut(ty.index())
            .ok_or_else(|| Error::TypeNotFound(ty.to_string()))
    }

    pub(crate) fn property_ref(&self, property: PropertyId) -> Result<&Property> {
        self.properties
            .get(property.index())
            .ok_or_else(|| Error::PropertyNotFound(property.to_string()))
    }

    pub(crate) fn property_mut(&mut self, property: PropertyId) -> Result<&mut Property> {
        self.properties
            .get_mut(property.index())
            .ok_or_else(|| Error::PropertyNotFound(property.to_string()))
    }

    pub(crate) fn entity_ref(&self, entity: EntityId) -> Result<&Entity> {
        self.entities
            .get(&entity)
            .ok_or_else(|| Error::EntityNotFound(entity.to_string()))
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("config", &self.config)
            .field("types", &self.types.len())
            .field("properties", &self.properties.len())
            .field("rules", &self.rules.len())
            .field("entities", &self.entities.len())
            .field("scope_depth", &self.scope.depth())
            .finish()
    }
}
