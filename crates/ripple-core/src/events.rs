//! Ordered subscriber lists and the notifications published by a model

use crate::identity::{EntityId, PropertyId, RuleId, TypeId};
use std::fmt;

/// Token returned by [`Dispatcher::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// An ordered list of handlers invoked synchronously in subscription order
pub struct Dispatcher<A> {
    next: u64,
    handlers: Vec<(Subscription, Box<dyn Fn(&A)>)>,
}

impl<A> Dispatcher<A> {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self {
            next: 0,
            handlers: Vec::new(),
        }
    }

    /// Add a handler at the end of the list
    pub fn subscribe(&mut self, handler: impl Fn(&A) + 'static) -> Subscription {
        let token = Subscription(self.next);
        self.next += 1;
        self.handlers.push((token, Box::new(handler)));
        token
    }

    /// Remove a handler, returning whether it was present
    pub fn unsubscribe(&mut self, token: Subscription) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(t, _)| *t != token);
        self.handlers.len() != before
    }

    /// Invoke every handler in order
    pub fn dispatch(&self, args: &A) {
        for (_, handler) in &self.handlers {
            handler(args);
        }
    }

    /// Get the number of handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if there are no handlers
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<A> Default for Dispatcher<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Dispatcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Notification published on the owning model
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// An entity was added to its type's pools
    EntityRegistered { entity: EntityId, type_id: TypeId },
    /// An entity was removed from its type's pools
    EntityUnregistered { entity: EntityId, type_id: TypeId },
    /// A property was declared on a type
    PropertyAdded { property: PropertyId, type_id: TypeId },
    /// A condition produced by a rule appeared on or disappeared from an entity
    ConditionChanged {
        entity: EntityId,
        rule: RuleId,
        present: bool,
    },
}

/// Arguments of the per-type initialization events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityInit {
    /// The entity being initialized
    pub entity: EntityId,
    /// The runtime type of the entity (the dispatching type may be a base)
    pub type_id: TypeId,
}

/// Events raised on a single type
#[derive(Debug, Default)]
pub struct TypeEvents {
    /// A new entity (generated id) finished construction
    pub init_new: Dispatcher<EntityInit>,
    /// An existing entity (supplied id) finished construction
    pub init_existing: Dispatcher<EntityInit>,
    /// A property was declared on this type
    pub property_added: Dispatcher<PropertyId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_dispatch_in_subscription_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::<i32>::new();

        let a = Rc::clone(&seen);
        dispatcher.subscribe(move |v| a.borrow_mut().push(("a", *v)));
        let b = Rc::clone(&seen);
        dispatcher.subscribe(move |v| b.borrow_mut().push(("b", *v)));

        dispatcher.dispatch(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut dispatcher = Dispatcher::<()>::new();

        let c = Rc::clone(&count);
        let token = dispatcher.subscribe(move |_| *c.borrow_mut() += 1);
        assert_eq!(dispatcher.len(), 1);

        assert!(dispatcher.unsubscribe(token));
        assert!(!dispatcher.unsubscribe(token));
        dispatcher.dispatch(&());

        assert_eq!(*count.borrow(), 0);
        assert!(dispatcher.is_empty());
    }
}
