//! Event scopes: batching property changes and resolving rule cascades
//!
//! Every write lands in the innermost open scope. Leaving a nested scope
//! hands its pending changes to the parent; leaving the root scope resolves
//! them generation by generation:
//!
//! 1. changes are coalesced per (entity, property), keeping the first old
//!    value and the last new value; net no-ops are dropped
//! 2. `changed` subscribers are notified
//! 3. every rule triggered by the batch (plus the init rules of entities
//!    constructed in the batch) runs once per (rule, entity), in the order
//!    it was registered against the triggering property
//! 4. the writes those rules make form the next generation
//!
//! Resolution stops when a generation is empty, or gives up after
//! [`ModelConfig::max_resolution_passes`](crate::ModelConfig::max_resolution_passes)
//! generations. The ceiling is an approximate safety bound for runaway
//! cycles, not a precise cycle count.

use crate::identity::{EntityId, PropertyId, RuleId};
use crate::model::Model;
use crate::property::PropertyChange;
use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use std::any::Any;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::{debug, trace, warn};

type ExitCallback = Box<dyn FnOnce(&mut Model)>;

#[derive(Default)]
pub(crate) struct ScopeFrame {
    changes: Vec<PropertyChange>,
    inits: Vec<EntityId>,
    exit_callbacks: Vec<ExitCallback>,
}

/// The stack of open scopes owned by a model
#[derive(Default)]
pub(crate) struct EventScope {
    frames: Vec<ScopeFrame>,
    aborted: u64,
}

impl EventScope {
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    pub(crate) fn record(&mut self, change: PropertyChange) {
        if let Some(frame) = self.frames.last_mut() {
            frame.changes.push(change);
        }
    }

    pub(crate) fn record_init(&mut self, entity: EntityId) {
        if let Some(frame) = self.frames.last_mut() {
            frame.inits.push(entity);
        }
    }
}

impl fmt::Debug for EventScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventScope")
            .field("depth", &self.frames.len())
            .field("aborted", &self.aborted)
            .finish()
    }
}

impl Model {
    /// Run `action` inside a scope and return its result
    ///
    /// The scope is exited even if the action, a subscriber or an exit
    /// callback panics; the panic is resumed once the scope stack is
    /// restored and every exit callback has run. When this is
    /// the outermost scope, all pending changes are resolved before
    /// returning.
    pub fn perform<T>(&mut self, action: impl FnOnce(&mut Model) -> T) -> T {
        self.scope.frames.push(ScopeFrame::default());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(self)));
        self.exit_scope();
        match outcome {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Run `callback` when the current scope exits, or now if none is open
    pub fn on_exit(&mut self, callback: impl FnOnce(&mut Model) + 'static) {
        if let Some(frame) = self.scope.frames.last_mut() {
            frame.exit_callbacks.push(Box::new(callback));
            return;
        }
        callback(self);
    }

    /// Number of open scopes
    pub fn scope_depth(&self) -> usize {
        self.scope.depth()
    }

    pub fn is_scope_active(&self) -> bool {
        self.scope.is_active()
    }

    /// How many resolutions were abandoned at the ceiling
    pub fn aborted_resolutions(&self) -> u64 {
        self.scope.aborted
    }

    fn exit_scope(&mut self) {
        let Some(frame) = self.scope.frames.pop() else {
            return;
        };
        let ScopeFrame {
            changes,
            inits,
            exit_callbacks,
        } = frame;

        if let Some(parent) = self.scope.frames.last_mut() {
            parent.changes.extend(changes);
            parent.inits.extend(inits);
            if let Some(payload) = self.run_exit_callbacks(exit_callbacks) {
                panic::resume_unwind(payload);
            }
            return;
        }

        // Rules run beneath a resolution frame so their writes are
        // collected as the next generation instead of resolving on their own.
        self.scope.frames.push(ScopeFrame {
            changes,
            inits,
            exit_callbacks: Vec::new(),
        });
        let resolved = panic::catch_unwind(AssertUnwindSafe(|| self.resolve()));
        if resolved.is_err() {
            warn!("resolution interrupted by a panic, pending changes were dropped");
        }

        // A panicking subscriber can leave the resolution frame open.
        let mut callbacks = exit_callbacks;
        for leftover in self.scope.frames.drain(..) {
            callbacks.extend(leftover.exit_callbacks);
        }
        let failed = self.run_exit_callbacks(callbacks);

        if let Err(payload) = resolved {
            panic::resume_unwind(payload);
        }
        if let Some(payload) = failed {
            panic::resume_unwind(payload);
        }
    }

    /// Run every callback, returning the first panic raised
    fn run_exit_callbacks(
        &mut self,
        callbacks: Vec<ExitCallback>,
    ) -> Option<Box<dyn Any + Send>> {
        let mut first_panic = None;
        for callback in callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(self))) {
                first_panic.get_or_insert(payload);
            }
        }
        first_panic
    }

    fn resolve(&mut self) {
        let mut passes = 0;
        loop {
            let Some(frame) = self.scope.frames.last_mut() else {
                return;
            };
            let changes = mem::take(&mut frame.changes);
            let inits = mem::take(&mut frame.inits);
            if changes.is_empty() && inits.is_empty() {
                if passes > 1 {
                    debug!(passes, "resolution settled");
                }
                return;
            }

            if passes >= self.config.max_resolution_passes() {
                self.scope.aborted += 1;
                warn!(
                    passes,
                    discarded = changes.len(),
                    "maximum resolution passes reached, remaining changes were not resolved"
                );
                return;
            }

            passes += 1;
            self.resolve_generation(changes, inits);
        }
    }

    fn resolve_generation(&mut self, changes: Vec<PropertyChange>, inits: Vec<EntityId>) {
        let mut coalesced: IndexMap<(EntityId, PropertyId), PropertyChange> = IndexMap::new();
        for change in changes {
            if !self.entities.contains_key(&change.entity) {
                continue;
            }
            match coalesced.entry((change.entity, change.property)) {
                Entry::Occupied(mut pending) => pending.get_mut().new_value = change.new_value,
                Entry::Vacant(slot) => {
                    slot.insert(change);
                }
            }
        }
        coalesced.retain(|_, change| !change.old_value.same_as(&change.new_value));

        let mut pending: IndexSet<(RuleId, EntityId)> = IndexSet::new();
        for entity in inits {
            pending.extend(self.init_rules(entity));
        }
        for change in coalesced.values() {
            if let Some(property) = self.properties.get(change.property.index()) {
                property.changed.dispatch(change);
            }
            pending.extend(self.triggered_by(change.entity, change.property));
        }

        for (rule, entity) in pending {
            if self.entities.contains_key(&entity) {
                self.run_rule(rule, entity);
            }
        }
    }

    /// Rules that run when `entity` is constructed, root type's first
    fn init_rules(&self, entity: EntityId) -> Vec<(RuleId, EntityId)> {
        let Some(type_id) = self.entities.get(&entity).map(|e| e.meta.type_id) else {
            return Vec::new();
        };
        let chain = self.chain(type_id).unwrap_or_default();
        chain
            .iter()
            .rev()
            .flat_map(|t| self.types[t.index()].rules.iter().copied())
            .filter(|rule| self.rules[rule.index()].on_init)
            .map(|rule| (rule, entity))
            .collect()
    }

    /// (rule, root entity) pairs whose trigger paths pass through this change
    fn triggered_by(&self, entity: EntityId, property: PropertyId) -> Vec<(RuleId, EntityId)> {
        let Some(meta) = self.properties.get(property.index()) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for rule in &meta.rules {
            let record = &self.rules[rule.index()];
            for path in &record.triggers {
                for (depth, step) in path.steps.iter().enumerate() {
                    if *step != property {
                        continue;
                    }
                    if depth == 0 {
                        if self.is_instance_of(entity, record.root_type) {
                            out.push((*rule, entity));
                        }
                        continue;
                    }
                    for root in self.types[record.root_type.index()].pool.values() {
                        if path.navigate(self, *root, depth).contains(&entity) {
                            out.push((*rule, *root));
                        }
                    }
                }
            }
        }
        out
    }

    fn run_rule(&mut self, rule: RuleId, entity: EntityId) {
        let Some(record) = self.rules.get(rule.index()) else {
            return;
        };
        let body = Rc::clone(&record.body);
        let name = record.name.clone();

        trace!(rule = %name, %entity, "executing rule");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.perform(|m| body.execute(m, rule, entity))
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(rule = %name, %entity, error = %err, "rule failed"),
            Err(_) => warn!(rule = %name, %entity, "rule panicked"),
        }
    }
}
