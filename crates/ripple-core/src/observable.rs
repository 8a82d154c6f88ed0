//! Observable sequence used for a type's known instances

use crate::events::{Dispatcher, Subscription};
use std::fmt;

/// A change to an [`ObservableList`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange<T> {
    /// An item was appended at `index`
    Added { item: T, index: usize },
    /// An item was removed from `index`
    Removed { item: T, index: usize },
}

/// A list that notifies subscribers when items are added or removed
pub struct ObservableList<T> {
    items: Vec<T>,
    changed: Dispatcher<ListChange<T>>,
}

impl<T: Clone + PartialEq> ObservableList<T> {
    /// Create a list with initial items (no notifications are raised for them)
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            changed: Dispatcher::new(),
        }
    }

    /// Append an item
    pub fn push(&mut self, item: T) {
        self.items.push(item.clone());
        let index = self.items.len() - 1;
        self.changed.dispatch(&ListChange::Added { item, index });
    }

    /// Remove the first occurrence of an item
    pub fn remove(&mut self, item: &T) -> bool {
        match self.items.iter().position(|i| i == item) {
            Some(index) => {
                let item = self.items.remove(index);
                self.changed.dispatch(&ListChange::Removed { item, index });
                true
            }
            None => false,
        }
    }

    /// Subscribe to additions and removals
    pub fn subscribe(&mut self, handler: impl Fn(&ListChange<T>) + 'static) -> Subscription {
        self.changed.subscribe(handler)
    }

    /// Remove a change subscriber
    pub fn unsubscribe(&mut self, token: Subscription) -> bool {
        self.changed.unsubscribe(token)
    }

    /// Check if an item is present
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Get an item by position
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterate over the items
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Get the items as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Get the number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableList")
            .field("items", &self.items)
            .field("subscribers", &self.changed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_push_and_remove_notify() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = ObservableList::new(vec![1, 2]);

        let sink = Rc::clone(&log);
        list.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        list.push(3);
        assert!(list.remove(&1));
        assert!(!list.remove(&9));

        assert_eq!(list.as_slice(), &[2, 3]);
        assert_eq!(
            *log.borrow(),
            vec![
                ListChange::Added { item: 3, index: 2 },
                ListChange::Removed { item: 1, index: 0 },
            ]
        );
    }
}
