//! Reactive Store
//!
//! A store (context) is a key/value container with per-key subscribers. It is
//! the foundation everything else builds on: computed properties live inside
//! it, scope resolution hands one back, and list reconciliation is driven by
//! one of its subscriptions.
//!
//! # Notification Semantics
//!
//! - `publish`, `add` and `notify` run every subscriber for the key
//!   synchronously, in subscription order, before returning.
//! - `publish` notifies on *every* call, even when the new value equals the
//!   old one. Computed re-notification relies on this, so do not add an
//!   equality short-circuit here.
//! - Subscriber lists are snapshotted before fan-out. A callback may remove
//!   its own (or any other) subscription, or publish again, without
//!   corrupting the iteration.
//!
//! # Strict and Dynamic Stores
//!
//! Strict stores only know the keys they were built with (plus later `add`s);
//! touching anything else is a diagnostic. Dynamic stores treat an absent key
//! as holding `Undefined`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::{trace, warn};

use super::computed::{Computed, Dependency, Derive};
use super::context::TrackingContext;
use super::scheduler::{Scheduler, TaskKey};
use super::subscriber::{SubscriberEntry, SubscriberId, Subscription};
use super::value::{Value, ValueMap};
use crate::config::RuntimeConfig;
use crate::error::{StoreError, TypeMismatch};

static STORE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_store_id() -> u64 {
    STORE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// How a store treats keys it does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    /// Unknown keys are diagnostics.
    #[default]
    Strict,
    /// Unknown keys read as `Undefined` and may be published to.
    Dynamic,
}

enum SchemaEntry {
    Value(Value),
    Computed {
        deps: Option<SmallVec<[Dependency; 4]>>,
        derive: Derive,
    },
}

/// Initial contents of a store.
#[derive(Default)]
pub struct Schema {
    entries: Vec<(String, SchemaEntry)>,
}

impl Schema {
    /// A schema with no properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// A plain property.
    pub fn value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .push((key.into(), SchemaEntry::Value(value.into())));
        self
    }

    /// A computed property whose dependencies are discovered on first read.
    pub fn computed<F>(mut self, key: impl Into<String>, derive: F) -> Self
    where
        F: Fn(&Store) -> Value + 'static,
    {
        self.entries.push((
            key.into(),
            SchemaEntry::Computed {
                deps: None,
                derive: Rc::new(derive),
            },
        ));
        self
    }

    /// A computed property with an explicit dependency list.
    pub fn computed_with<I, F>(mut self, key: impl Into<String>, deps: I, derive: F) -> Self
    where
        I: IntoIterator<Item = Dependency>,
        F: Fn(&Store) -> Value + 'static,
    {
        self.entries.push((
            key.into(),
            SchemaEntry::Computed {
                deps: Some(deps.into_iter().collect()),
                derive: Rc::new(derive),
            },
        ));
        self
    }

    /// A value-only schema from a JSON object, keeping its key order.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => map
                .into_iter()
                .fold(Self::new(), |schema, (key, value)| schema.value(key, value)),
            other => {
                let kind = Value::from(other).kind();
                warn!(%kind, "schema must be a JSON object; using an empty schema");
                Self::new()
            }
        }
    }

    /// Number of declared properties, computed ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) struct StoreInner {
    id: u64,
    uid: String,
    mode: StoreMode,
    warn_on_type_mismatch: bool,
    props: RefCell<ValueMap>,
    computed: RefCell<HashMap<String, Computed>>,
    subscribers: RefCell<HashMap<String, SmallVec<[SubscriberEntry; 2]>>>,
    scheduler: Scheduler,
    torn_down: Cell<bool>,
}

impl StoreInner {
    pub(crate) fn remove_subscriber(&self, key: &str, id: SubscriberId) {
        let mut subscribers = self.subscribers.borrow_mut();
        if let Some(list) = subscribers.get_mut(key) {
            list.retain(|entry| entry.id != id);
            if list.is_empty() {
                subscribers.remove(key);
            }
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        // Detach from other stores this one's computed keys listen to.
        for computed in self.computed.get_mut().values_mut() {
            computed.untrack();
        }
    }
}

/// Handle to a reactive store. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// An anonymous strict store with its own scheduler.
    pub fn new(schema: Schema) -> Self {
        Self::with_scheduler(schema, Scheduler::new())
    }

    /// An anonymous dynamic store with its own scheduler.
    pub fn dynamic(schema: Schema) -> Self {
        Self::build(
            schema,
            None,
            StoreMode::Dynamic,
            Scheduler::new(),
            &RuntimeConfig::default(),
        )
    }

    /// An anonymous strict store sharing `scheduler`.
    pub fn with_scheduler(schema: Schema, scheduler: Scheduler) -> Self {
        Self::build(
            schema,
            None,
            StoreMode::Strict,
            scheduler,
            &RuntimeConfig::default(),
        )
    }

    pub(crate) fn build(
        schema: Schema,
        uid: Option<String>,
        mode: StoreMode,
        scheduler: Scheduler,
        config: &RuntimeConfig,
    ) -> Self {
        let id = next_store_id();
        let mut props = ValueMap::new();
        let mut computed = HashMap::new();

        for (key, entry) in schema.entries {
            match entry {
                SchemaEntry::Value(value) => {
                    computed.remove(&key);
                    props.insert(key, value);
                }
                SchemaEntry::Computed { deps, derive } => {
                    props.shift_remove(&key);
                    computed.insert(key, Computed::new(derive, deps));
                }
            }
        }

        Self {
            inner: Rc::new(StoreInner {
                id,
                uid: uid.unwrap_or_else(|| format!("ctx-{id}")),
                mode,
                warn_on_type_mismatch: config.warn_on_type_mismatch,
                props: RefCell::new(props),
                computed: RefCell::new(computed),
                subscribers: RefCell::new(HashMap::new()),
                scheduler,
                torn_down: Cell::new(false),
            }),
        }
    }

    /// Process-unique numeric id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Registry uid. Stores built outside a registry get `ctx-<id>`.
    pub fn uid(&self) -> &str {
        &self.inner.uid
    }

    /// Whether unknown keys are errors or `Undefined`.
    pub fn mode(&self) -> StoreMode {
        self.inner.mode
    }

    /// The scheduler computed re-notifications are queued on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Whether two handles point at the same store.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.get()
    }

    /// Whether `key` is a computed property.
    pub fn is_computed(&self, key: &str) -> bool {
        self.inner.computed.borrow().contains_key(key)
    }

    /// Whether a computed key has been evaluated and is listening to its
    /// dependencies.
    pub fn is_tracked(&self, key: &str) -> bool {
        self.inner
            .computed
            .borrow()
            .get(key)
            .is_some_and(|computed| computed.tracked)
    }

    /// Plain keys in insertion order, followed by computed keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.props.borrow().keys().cloned().collect();
        let mut computed: Vec<String> = self.inner.computed.borrow().keys().cloned().collect();
        computed.sort();
        keys.extend(computed);
        keys
    }

    /// Number of live subscribers on `key`. Computed dependency links count.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .subscribers
            .borrow()
            .get(key)
            .map_or(0, |list| list.len())
    }

    /// A key-bound accessor for field-style reads and writes.
    pub fn prop(&self, key: impl Into<String>) -> Prop {
        Prop {
            store: self.clone(),
            key: key.into(),
        }
    }

    // ------------------------------------------------------------------
    // Core operations
    // ------------------------------------------------------------------

    /// Existence check. Strict stores check ownership; dynamic stores check
    /// that the value is defined.
    pub fn has(&self, key: &str) -> bool {
        if self.is_computed(key) {
            return true;
        }
        let props = self.inner.props.borrow();
        match self.inner.mode {
            StoreMode::Strict => props.contains_key(key),
            StoreMode::Dynamic => props.get(key).is_some_and(|v| !v.is_undefined()),
        }
    }

    /// Read a property. Computed properties are derived on the spot.
    pub fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.ensure_live()?;
        let known = self.is_computed(key) || self.inner.props.borrow().contains_key(key);
        if !known && self.inner.mode == StoreMode::Strict {
            return self.unknown(key);
        }
        if TrackingContext::is_active() {
            TrackingContext::track(Dependency::on(self, key));
        }
        Ok(self.current(key))
    }

    /// Insert `value` unless the key already exists (or `rewrite` is set).
    ///
    /// Returns `Ok(true)` when written, `Ok(false)` for the silent no-op.
    pub fn add(&self, key: &str, value: impl Into<Value>, rewrite: bool) -> Result<bool, StoreError> {
        self.ensure_live()?;
        if self.has(key) {
            if !rewrite {
                return Ok(false);
            }
            if self.is_computed(key) {
                return self.diagnose(StoreError::ComputedWrite {
                    store: self.uid().to_string(),
                    key: key.to_string(),
                });
            }
        }
        self.write(key, value.into());
        self.fire(key);
        Ok(true)
    }

    /// Overwrite an existing property and notify, unconditionally.
    pub fn publish(&self, key: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        self.ensure_live()?;
        if self.is_computed(key) {
            return self.diagnose(StoreError::ComputedWrite {
                store: self.uid().to_string(),
                key: key.to_string(),
            });
        }
        let known = self.inner.props.borrow().contains_key(key);
        if !known && self.inner.mode == StoreMode::Strict {
            return self.unknown(key);
        }
        self.write(key, value.into());
        self.fire(key);
        Ok(())
    }

    /// `publish` each entry in iteration order. Failing entries are logged
    /// and skipped; returns how many were written.
    pub fn multi_publish<I, K, V>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        entries
            .into_iter()
            .map(|(key, value)| self.publish(key.as_ref(), value))
            .filter(Result::is_ok)
            .count()
    }

    /// Subscribe and immediately call `callback` with the current value.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Result<Subscription, StoreError>
    where
        F: Fn(&Value) + 'static,
    {
        self.subscribe_with(key, true, callback)
    }

    /// Subscribe; call `callback` right away only if `init` is set.
    ///
    /// Subscribing to a computed key always evaluates it once so that it
    /// starts tracking its dependencies.
    pub fn subscribe_with<F>(&self, key: &str, init: bool, callback: F) -> Result<Subscription, StoreError>
    where
        F: Fn(&Value) + 'static,
    {
        self.ensure_live()?;
        let computed = self.is_computed(key);
        if !computed && self.inner.mode == StoreMode::Strict && !self.has(key) {
            return self.unknown(key);
        }

        let entry = SubscriberEntry::new(Rc::new(callback));
        if init || computed {
            let value = self.current(key);
            if init {
                entry.notify(&value);
            }
        }

        let handle = Subscription::new(&entry, key, Rc::downgrade(&self.inner));
        self.inner
            .subscribers
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .push(entry);
        trace!(store = %self.uid(), key, "subscribed");
        Ok(handle)
    }

    /// Re-run every subscriber of `key` with its current value.
    pub fn notify(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_live()?;
        if self.inner.mode == StoreMode::Strict && !self.has(key) {
            return self.unknown(key);
        }
        self.fire(key);
        Ok(())
    }

    /// Replace the derivation of a computed key.
    ///
    /// Tracking starts over (the new derivation may read different keys) and
    /// subscribers are notified with the new value.
    pub fn redefine<F>(&self, key: &str, derive: F) -> Result<(), StoreError>
    where
        F: Fn(&Store) -> Value + 'static,
    {
        self.ensure_live()?;
        if !self.is_computed(key) {
            return self.diagnose(StoreError::NotComputed {
                store: self.uid().to_string(),
                key: key.to_string(),
            });
        }
        // Untrack outside the borrow: removing a self-link touches this store.
        let stale = {
            let mut computed = self.inner.computed.borrow_mut();
            match computed.get_mut(key) {
                Some(entry) => {
                    entry.tracked = false;
                    entry.derive = Rc::new(derive);
                    std::mem::take(&mut entry.links)
                }
                None => Vec::new(),
            }
        };
        for link in stale {
            link.remove();
        }
        self.inner.scheduler.cancel(&TaskKey::new(self.id(), key));
        self.fire(key);
        Ok(())
    }

    /// Invalidate every subscription and computed link. Later operations on
    /// this store are diagnostics; outstanding handles become inert.
    pub fn teardown(&self) {
        if self.inner.torn_down.replace(true) {
            return;
        }
        let subscribers = std::mem::take(&mut *self.inner.subscribers.borrow_mut());
        for entry in subscribers.into_values().flatten() {
            entry.active.set(false);
        }
        let links: Vec<Subscription> = self
            .inner
            .computed
            .borrow_mut()
            .values_mut()
            .flat_map(|computed| {
                computed.tracked = false;
                computed.links.drain(..).collect::<Vec<_>>()
            })
            .collect();
        for link in links {
            link.remove();
        }
        self.inner.scheduler.cancel_store(self.id());
        trace!(store = %self.uid(), "torn down");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_live(&self) -> Result<(), StoreError> {
        if self.is_torn_down() {
            return self.diagnose(StoreError::TornDown {
                store: self.uid().to_string(),
            });
        }
        Ok(())
    }

    fn unknown<T>(&self, key: &str) -> Result<T, StoreError> {
        self.diagnose(StoreError::UnknownProperty {
            store: self.uid().to_string(),
            key: key.to_string(),
        })
    }

    fn diagnose<T>(&self, err: StoreError) -> Result<T, StoreError> {
        warn!(store = %self.uid(), "{err}");
        Err(err)
    }

    /// Store a plain value, checking type consistency first.
    fn write(&self, key: &str, value: Value) {
        let previous = self.inner.props.borrow_mut().insert(key.to_string(), value.clone());
        if !self.inner.warn_on_type_mismatch {
            return;
        }
        if let Some(previous) = previous {
            if !previous.is_nullish() && !value.is_nullish() && previous.kind() != value.kind() {
                let mismatch = TypeMismatch {
                    key: key.to_string(),
                    previous: previous.kind(),
                    next: value.kind(),
                };
                warn!(store = %self.uid(), "{mismatch}");
            }
        }
    }

    /// Current value without diagnostics or tracking.
    fn current(&self, key: &str) -> Value {
        if self.is_computed(key) {
            return self.evaluate(key);
        }
        self.inner
            .props
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Run a computed derivation in its own tracking frame, linking its
    /// dependencies if this is the first evaluation.
    fn evaluate(&self, key: &str) -> Value {
        let (id, derive, explicit, tracked) = {
            let computed = self.inner.computed.borrow();
            let Some(entry) = computed.get(key) else {
                return Value::Undefined;
            };
            (entry.id, entry.derive.clone(), entry.explicit.clone(), entry.tracked)
        };

        let (value, reads) = {
            let ctx = TrackingContext::enter(id);
            let value = (derive)(self);
            (value, ctx.reads())
        };

        if !tracked {
            self.link(key, explicit.unwrap_or(reads));
        }
        value
    }

    fn link(&self, key: &str, deps: SmallVec<[Dependency; 4]>) {
        // Mark first: subscribing below may evaluate other computed keys that
        // read this one.
        match self.inner.computed.borrow_mut().get_mut(key) {
            Some(entry) => entry.tracked = true,
            None => return,
        }

        let mut links = Vec::with_capacity(deps.len());
        for dep in &deps {
            let target = dep.target(self);
            if target.ptr_eq(self) && dep.key() == key {
                continue;
            }
            let owner = Rc::downgrade(&self.inner);
            let computed_key = key.to_string();
            let linked = target.subscribe_with(dep.key(), false, move |_| {
                schedule_renotify(&owner, &computed_key);
            });
            if let Ok(link) = linked {
                links.push(link);
            }
        }
        trace!(store = %self.uid(), key, deps = links.len(), "tracking computed property");

        if let Some(entry) = self.inner.computed.borrow_mut().get_mut(key) {
            entry.links.extend(links);
        }
    }

    /// Fan out the current value of `key` to a snapshot of its subscribers.
    fn fire(&self, key: &str) {
        if self.is_torn_down() {
            return;
        }
        let snapshot: SmallVec<[SubscriberEntry; 2]> = self
            .inner
            .subscribers
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_default();
        // Computed keys are evaluated even with nobody listening, which
        // re-establishes tracking after `redefine`.
        if snapshot.is_empty() && !self.is_computed(key) {
            return;
        }
        let value = self.current(key);
        for entry in &snapshot {
            entry.notify(&value);
        }
    }
}

fn schedule_renotify(owner: &Weak<StoreInner>, key: &str) {
    let Some(inner) = owner.upgrade() else {
        return;
    };
    let store = Store { inner };
    if store.is_torn_down() {
        return;
    }
    let task_owner = owner.clone();
    let task_key = key.to_string();
    store
        .inner
        .scheduler
        .schedule(TaskKey::new(store.id(), key), move || {
            if let Some(inner) = task_owner.upgrade() {
                Store { inner }.fire(&task_key);
            }
        });
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("uid", &self.inner.uid)
            .field("mode", &self.inner.mode)
            .field("keys", &self.keys())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

/// Field-style accessor bound to one key of a store.
#[derive(Clone, Debug)]
pub struct Prop {
    store: Store,
    key: String,
}

impl Prop {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Same as [`Store::get`] on the bound key.
    pub fn get(&self) -> Result<Value, StoreError> {
        self.store.get(&self.key)
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<(), StoreError> {
        self.store.publish(&self.key, value)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
