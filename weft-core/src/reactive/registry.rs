//! Store Registry
//!
//! The registry maps uids to stores. It is the only state shared between
//! components: named scopes (`GAME/score`) and shared scopes (`*score`) both
//! resolve through it.
//!
//! It is an ordinary value rather than a global, so every test (or every
//! independent app mounted on one thread) can own an isolated registry.
//!
//! # Deferred Work
//!
//! Every store the registry creates shares the registry's [`Scheduler`], so a
//! single [`Registry::flush`] drains computed re-notifications across all of
//! them.

use std::cell::{Cell, RefCell};
use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::scheduler::Scheduler;
use super::store::{Schema, Store, StoreMode};
use crate::config::RuntimeConfig;
use crate::error::StoreError;

/// Maps uids to stores and owns the scheduler they share.
pub struct Registry {
    stores: RefCell<IndexMap<String, Store>>,
    scheduler: Scheduler,
    config: RuntimeConfig,
    /// Last suffix handed out for an anonymous `ctx-<n>` uid.
    anonymous: Cell<u64>,
}

impl Registry {
    /// An empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// An empty registry whose stores and scheduler follow `config`.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            stores: RefCell::new(IndexMap::new()),
            scheduler: Scheduler::with_config(&config),
            config,
            anonymous: Cell::new(0),
        }
    }

    /// The configuration every store created here was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The scheduler shared by every store created here.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Drain deferred computed re-notifications for every store.
    pub fn flush(&self) -> usize {
        self.scheduler.flush()
    }

    /// Create and register a strict store.
    ///
    /// With `uid == None` a `ctx-<n>` uid not yet taken in this registry is
    /// generated. If `uid` is
    /// already taken, a diagnostic is logged and the store registered first
    /// is returned unchanged; `schema` is discarded.
    pub fn register(&self, schema: Schema, uid: Option<&str>) -> Store {
        self.register_as(schema, uid, StoreMode::Strict)
    }

    /// Like [`register`](Self::register) with an explicit mode.
    pub fn register_as(&self, schema: Schema, uid: Option<&str>, mode: StoreMode) -> Store {
        if let Some(uid) = uid {
            if let Some(existing) = self.stores.borrow().get(uid) {
                let err = StoreError::DuplicateRegistration {
                    uid: uid.to_string(),
                };
                warn!("{err}");
                return existing.clone();
            }
        }

        let uid = match uid {
            Some(uid) => uid.to_string(),
            None => self.anonymous_uid(),
        };
        let store = Store::build(
            schema,
            Some(uid),
            mode,
            self.scheduler.clone(),
            &self.config,
        );
        debug!(uid = %store.uid(), "registered store");
        self.stores
            .borrow_mut()
            .insert(store.uid().to_string(), store.clone());
        store
    }

    /// Look up a store. With `notify`, a miss is logged as a diagnostic.
    pub fn get(&self, uid: &str, notify: bool) -> Option<Store> {
        let found = self.stores.borrow().get(uid).cloned();
        if found.is_none() && notify {
            let err = StoreError::UnknownStore {
                uid: uid.to_string(),
            };
            warn!("{err}");
        }
        found
    }

    /// Look up a store, creating an empty strict one on first reference.
    pub fn get_or_create(&self, uid: &str) -> Store {
        match self.get(uid, false) {
            Some(store) => store,
            None => self.register(Schema::new(), Some(uid)),
        }
    }

    /// Remove a store and tear it down. Its subscriptions become inert.
    pub fn delete(&self, uid: &str) -> bool {
        let removed = self.stores.borrow_mut().shift_remove(uid);
        match removed {
            Some(store) => {
                store.teardown();
                debug!(uid, "deleted store");
                true
            }
            None => false,
        }
    }

    /// Whether `uid` is registered.
    pub fn contains(&self, uid: &str) -> bool {
        self.stores.borrow().contains_key(uid)
    }

    /// Registered uids in registration order.
    pub fn uids(&self) -> Vec<String> {
        self.stores.borrow().keys().cloned().collect()
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.borrow().is_empty()
    }

    /// Next `ctx-<n>` that no store (named or anonymous) holds.
    fn anonymous_uid(&self) -> String {
        let stores = self.stores.borrow();
        loop {
            let n = self.anonymous.get() + 1;
            self.anonymous.set(n);
            let uid = format!("ctx-{n}");
            if !stores.contains_key(&uid) {
                return uid;
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("uids", &self.uids())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Value;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn registers_named_and_anonymous_stores() {
        let registry = Registry::new();

        let named = registry.register(Schema::new().value("score", 0), Some("GAME"));
        let anon = registry.register(Schema::new(), None);

        assert_eq!(named.uid(), "GAME");
        assert!(anon.uid().starts_with("ctx-"));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("GAME", true).unwrap().ptr_eq(&named));
        assert!(registry.get(anon.uid(), true).unwrap().ptr_eq(&anon));
    }

    #[test]
    fn anonymous_uids_skip_taken_names() {
        let registry = Registry::new();
        let explicit = registry.register(Schema::new().value("v", "named"), Some("ctx-2"));

        let first = registry.register(Schema::new().value("v", "anon"), None);
        let second = registry.register(Schema::new().value("v", "anon"), None);

        assert_eq!(first.uid(), "ctx-1");
        assert_eq!(second.uid(), "ctx-3");
        assert_eq!(registry.len(), 3);
        assert!(registry.get("ctx-2", true).unwrap().ptr_eq(&explicit));
        assert_eq!(explicit.get("v").unwrap(), Value::from("named"));
        assert!(!explicit.is_torn_down());
    }

    #[test]
    fn duplicate_registration_returns_first_store() {
        let registry = Registry::new();
        let first = registry.register(Schema::new().value("v", 1), Some("APP"));
        let second = registry.register(Schema::new().value("v", 2), Some("APP"));

        assert!(first.ptr_eq(&second));
        assert_eq!(second.get("v").unwrap(), Value::from(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn missing_lookup_returns_none() {
        let registry = Registry::new();
        assert!(registry.get("nope", true).is_none());
        assert!(registry.get("nope", false).is_none());
    }

    #[test]
    fn get_or_create_is_lazy_and_stable() {
        let registry = Registry::new();
        assert!(!registry.contains("LAZY"));

        let a = registry.get_or_create("LAZY");
        let b = registry.get_or_create("LAZY");

        assert!(a.ptr_eq(&b));
        assert_eq!(registry.uids(), ["LAZY"]);
    }

    #[test]
    fn delete_tears_down_subscriptions() {
        let registry = Registry::new();
        let store = registry.register(Schema::new().value("k", 0), Some("GONE"));
        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        let sub = store
            .subscribe_with("k", false, move |_| hits_clone.set(hits_clone.get() + 1))
            .unwrap();

        assert!(registry.delete("GONE"));
        assert!(!registry.delete("GONE"));
        assert!(registry.get("GONE", false).is_none());
        assert!(!sub.is_active());
        sub.remove();

        assert!(store.publish("k", 1).is_err());
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn stores_share_the_registry_scheduler() {
        let registry = Registry::new();
        let source = registry.register(Schema::new().value("n", 1), Some("SRC"));
        let source_for_derive = source.clone();
        let view = registry.register(
            Schema::new().computed("n_plus_one", move |_: &Store| {
                let n = source_for_derive.get("n").ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
                Value::from(n + 1.0)
            }),
            Some("VIEW"),
        );

        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        let _sub = view
            .subscribe_with("n_plus_one", false, move |_| hits_clone.set(hits_clone.get() + 1))
            .unwrap();

        source.publish("n", 2).unwrap();
        assert_eq!(registry.scheduler().pending(), 1);
        assert_eq!(registry.flush(), 1);
        assert_eq!(hits.get(), 1);
    }
}
