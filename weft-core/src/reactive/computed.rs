//! Computed Properties
//!
//! A computed property is a key whose value comes from a derivation function
//! instead of the property map. It is evaluated fresh on every read, so it is
//! never stale.
//!
//! # Dependency Tracking
//!
//! The first read of a computed key evaluates it and marks it *tracked*:
//!
//! - With an explicit dependency list, those keys are subscribed to. They may
//!   live in other stores.
//! - Otherwise the reads made during that first evaluation are recorded by the
//!   [`TrackingContext`](super::TrackingContext) and subscribed to.
//!
//! Once tracked, any notification of a dependency schedules a deferred
//! re-notification of the computed key on the owning store's scheduler.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::store::Store;
use super::subscriber::{SubscriberId, Subscription};
use super::value::Value;

/// A derivation function. It receives the store that owns the computed key.
pub type Derive = Rc<dyn Fn(&Store) -> Value>;

/// One dependency of a computed property.
#[derive(Clone)]
pub struct Dependency {
    /// `None` means the store that owns the computed property.
    store: Option<Store>,
    key: String,
}

impl Dependency {
    /// A key in the store that declares the computed property.
    pub fn local(key: impl Into<String>) -> Self {
        Self {
            store: None,
            key: key.into(),
        }
    }

    /// A key in another store.
    pub fn on(store: &Store, key: impl Into<String>) -> Self {
        Self {
            store: Some(store.clone()),
            key: key.into(),
        }
    }

    /// The dependency's property name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The foreign store, or `None` for the owning store.
    pub fn store(&self) -> Option<&Store> {
        self.store.as_ref()
    }

    /// The store this dependency points at, given the owning store.
    pub(crate) fn target<'a>(&'a self, owner: &'a Store) -> &'a Store {
        self.store.as_ref().unwrap_or(owner)
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        let same_store = match (&self.store, &other.store) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        same_store && self.key == other.key
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.as_ref().map(|s| s.uid().to_string());
        f.debug_struct("Dependency")
            .field("store", &store)
            .field("key", &self.key)
            .finish()
    }
}

/// Store-side state of one computed property.
pub(crate) struct Computed {
    pub(crate) id: SubscriberId,
    pub(crate) derive: Derive,
    pub(crate) explicit: Option<SmallVec<[Dependency; 4]>>,
    pub(crate) tracked: bool,
    pub(crate) links: Vec<Subscription>,
}

impl Computed {
    pub(crate) fn new(derive: Derive, explicit: Option<SmallVec<[Dependency; 4]>>) -> Self {
        Self {
            id: SubscriberId::new(),
            derive,
            explicit,
            tracked: false,
            links: Vec::new(),
        }
    }

    /// Forget the current dependency subscriptions.
    pub(crate) fn untrack(&mut self) {
        for link in self.links.drain(..) {
            link.remove();
        }
        self.tracked = false;
    }
}
