//! Subscriber types for the reactive system.
//!
//! A subscription is owned from two sides: the store keeps the callback in its
//! per-key subscriber list, and the caller keeps a [`Subscription`] handle.
//! Removing through the handle detaches both sides in one step.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::store::StoreInner;
use super::value::Value;

/// Unique identifier for a subscriber.
///
/// Every callback registered with a store, and every computed property, gets
/// one. Used to find the entry again on removal and to attribute tracked reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) type Callback = Rc<dyn Fn(&Value)>;

/// The store-side half of a subscription.
#[derive(Clone)]
pub(crate) struct SubscriberEntry {
    pub(crate) id: SubscriberId,
    pub(crate) callback: Callback,
    /// Shared with the handle. Cleared on removal so an in-flight fan-out
    /// skips the entry even though it iterates a snapshot.
    pub(crate) active: Rc<Cell<bool>>,
}

impl SubscriberEntry {
    pub(crate) fn new(callback: Callback) -> Self {
        Self {
            id: SubscriberId::new(),
            callback,
            active: Rc::new(Cell::new(true)),
        }
    }

    pub(crate) fn notify(&self, value: &Value) {
        if self.active.get() {
            (self.callback)(value);
        }
    }
}

/// Caller-side handle returned by `Store::subscribe`.
///
/// Dropping the handle does *not* unsubscribe; call [`Subscription::remove`].
/// Removal is safe from inside the subscriber's own callback and after the
/// owning store is gone, where it does nothing.
pub struct Subscription {
    id: SubscriberId,
    key: String,
    store: Weak<StoreInner>,
    active: Rc<Cell<bool>>,
}

impl Subscription {
    pub(crate) fn new(entry: &SubscriberEntry, key: &str, store: Weak<StoreInner>) -> Self {
        Self {
            id: entry.id,
            key: key.to_string(),
            store,
            active: Rc::clone(&entry.active),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The property key this subscription listens to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `false` once removed, or once the owning store was torn down.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Detach from the store. Idempotent.
    pub fn remove(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(store) = self.store.upgrade() {
            store.remove_subscriber(&self.key, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn inactive_entry_is_skipped() {
        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        let entry = SubscriberEntry::new(Rc::new(move |_| hits_clone.set(hits_clone.get() + 1)));

        entry.notify(&Value::Null);
        entry.active.set(false);
        entry.notify(&Value::Null);

        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn orphaned_handle_removal_is_a_no_op() {
        let entry = SubscriberEntry::new(Rc::new(|_| {}));
        let handle = Subscription::new(&entry, "count", Weak::new());

        assert!(handle.is_active());
        handle.remove();
        handle.remove();
        assert!(!handle.is_active());
        assert!(!entry.active.get());
    }
}
