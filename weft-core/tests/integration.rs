//! Integration Tests for the State Layer
//!
//! These tests drive stores, the registry, scope resolution and list
//! reconciliation together through the public API only.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use weft_core::reactive::{Dependency, Registry, Schema, Store, Value};
use weft_core::reconcile::{
    Container, ElementFactory, IndexReconciler, KeyedReconciler, ListView, Reconcile,
};
use weft_core::scope::{ScopeResolver, ScopeTree};
use weft_core::{RuntimeConfig, StoreError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn recorder() -> (Rc<RefCell<Vec<Value>>>, impl Fn(&Value) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |v: &Value| sink.borrow_mut().push(v.clone()))
}

// ---- Stores ----

/// Subscribe runs immediately, publish runs synchronously, add never
/// overwrites by default.
#[test]
fn store_subscribe_publish_add() {
    init_tracing();
    let store = Store::new(Schema::new().value("count", 0));
    let (seen, cb) = recorder();

    let _sub = store.subscribe("count", cb).unwrap();
    assert_eq!(*seen.borrow(), [Value::from(0)]);

    store.publish("count", 5).unwrap();
    assert_eq!(*seen.borrow(), [Value::from(0), Value::from(5)]);

    assert_eq!(store.add("count", 99, false), Ok(false));
    assert_eq!(store.get("count").unwrap(), Value::from(5));
}

/// Publishing the same value twice notifies twice.
#[test]
fn publish_always_notifies() {
    let store = Store::new(Schema::new().value("flag", true));
    let hits = Rc::new(Cell::new(0));
    let counter = hits.clone();
    let _sub = store
        .subscribe_with("flag", false, move |_| counter.set(counter.get() + 1))
        .unwrap();

    store.publish("flag", true).unwrap();
    store.publish("flag", true).unwrap();

    assert_eq!(hits.get(), 2);
}

/// Strict stores reject unknown keys and computed writes without changing
/// any state.
#[test]
fn strict_store_diagnostics() {
    init_tracing();
    let store = Store::new(
        Schema::new()
            .value("a", 1)
            .computed("twice", |s: &Store| {
                Value::from(s.get("a").ok().and_then(|v| v.as_f64()).unwrap_or(0.0) * 2.0)
            }),
    );

    assert!(matches!(
        store.publish("missing", 1),
        Err(StoreError::UnknownProperty { .. })
    ));
    assert!(matches!(
        store.publish("twice", 10),
        Err(StoreError::ComputedWrite { .. })
    ));
    assert!(!store.has("missing"));
    assert_eq!(store.get("twice").unwrap(), Value::from(2));
}

// ---- Computed properties ----

/// Several dependency writes between flushes produce one re-notification
/// carrying the final value.
#[test]
fn computed_renotification_is_coalesced_across_stores() {
    init_tracing();
    let registry = Registry::new();
    let prices = registry.register(Schema::new().value("unit", 3), Some("prices"));
    let prices_for_derive = prices.clone();
    let cart = registry.register(
        Schema::new().value("qty", 1).computed_with(
            "total",
            [Dependency::local("qty"), Dependency::on(&prices, "unit")],
            move |s: &Store| {
                let qty = s.get("qty").ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
                let unit = prices_for_derive
                    .get("unit")
                    .ok()
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                Value::from(qty * unit)
            },
        ),
        Some("cart"),
    );

    let (seen, cb) = recorder();
    let _sub = cart.subscribe("total", cb).unwrap();
    assert_eq!(*seen.borrow(), [Value::from(3)]);

    cart.publish("qty", 2).unwrap();
    prices.publish("unit", 5).unwrap();
    cart.publish("qty", 4).unwrap();
    assert_eq!(seen.borrow().len(), 1);

    assert_eq!(registry.flush(), 1);
    assert_eq!(*seen.borrow(), [Value::from(3), Value::from(20)]);

    assert_eq!(registry.flush(), 0);
}

/// A computed key reading another computed key settles within one flush.
#[test]
fn chained_computed_settles_in_one_flush() {
    let registry = Registry::new();
    let store = registry.register(
        Schema::new()
            .value("n", 1)
            .computed("double", |s: &Store| {
                Value::from(s.get("n").ok().and_then(|v| v.as_f64()).unwrap_or(0.0) * 2.0)
            })
            .computed("quad", |s: &Store| {
                Value::from(s.get("double").ok().and_then(|v| v.as_f64()).unwrap_or(0.0) * 2.0)
            }),
        None,
    );
    let (seen, cb) = recorder();
    let _sub = store.subscribe_with("quad", false, cb).unwrap();

    store.publish("n", 5).unwrap();
    registry.flush();

    assert_eq!(seen.borrow().last(), Some(&Value::from(20)));
}

/// Deleting a store stops its deferred work and removes it from lookup.
#[test]
fn deleted_store_is_gone() {
    let registry = Registry::new();
    let store = registry.register(
        Schema::new()
            .value("x", 1)
            .computed("y", |s: &Store| s.get("x").unwrap_or_default()),
        Some("tmp"),
    );
    let (seen, cb) = recorder();
    let _sub = store.subscribe_with("y", false, cb).unwrap();
    store.publish("x", 2).unwrap();

    assert!(registry.delete("tmp"));
    assert!(registry.get("tmp", false).is_none());
    registry.flush();

    assert!(seen.borrow().is_empty());
    assert!(matches!(store.get("x"), Err(StoreError::TornDown { .. })));
}

/// Config loaded from JSON reaches the registry's scheduler.
#[test]
fn config_from_json_caps_flush_passes() {
    let config = RuntimeConfig::from_json(r#"{"max_flush_passes": 2}"#).unwrap();
    let registry = Registry::with_config(config);
    assert_eq!(registry.config().max_flush_passes, 2);
    assert_eq!(registry.config().max_ancestor_depth, 256);
}

// ---- Scope resolution ----

#[derive(Default)]
struct Component {
    parent: Option<usize>,
    context: Option<String>,
    store: RefCell<Option<Store>>,
    style: Vec<(String, String)>,
}

#[derive(Default)]
struct Page {
    nodes: Vec<Component>,
}

impl Page {
    fn add(&mut self, parent: Option<usize>, context: Option<&str>) -> usize {
        self.nodes.push(Component {
            parent,
            context: context.map(str::to_string),
            ..Component::default()
        });
        self.nodes.len() - 1
    }
}

impl ScopeTree for Page {
    type Node = usize;

    fn parent(&self, node: &usize) -> Option<usize> {
        self.nodes[*node].parent
    }

    fn local_store(&self, node: &usize) -> Store {
        self.nodes[*node]
            .store
            .borrow_mut()
            .get_or_insert_with(|| Store::new(Schema::new()))
            .clone()
    }

    fn existing_local_store(&self, node: &usize) -> Option<Store> {
        self.nodes[*node].store.borrow().clone()
    }

    fn context_name(&self, node: &usize) -> Option<String> {
        self.nodes[*node].context.clone()
    }

    fn computed_style(&self, node: &usize, property: &str) -> Option<String> {
        self.nodes[*node]
            .style
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value.clone())
    }
}

/// Every key form lands in the store its prefix names.
#[test]
fn resolver_routes_every_key_form() {
    init_tracing();
    let registry = Registry::new();
    let resolver = ScopeResolver::new(&registry);
    let mut page = Page::default();
    let root = page.add(None, Some("game"));
    let panel = page.add(Some(root), Some("game"));
    let button = page.add(Some(panel), Some("game"));
    page.nodes[button].style.push(("--accent".into(), " teal ".into()));

    page.local_store(&root)
        .add("parentVal", 7, false)
        .unwrap();

    let local = resolver.resolve(&page, &button, "count");
    assert!(local.store.ptr_eq(&page.local_store(&button)));
    assert_eq!(local.name, "count");

    let shared = resolver.resolve(&page, &button, "*score");
    assert_eq!(shared.store.uid(), "game");
    assert_eq!(shared.name, "score");

    let named = resolver.resolve(&page, &button, "GAME/score");
    assert_eq!(named.store.uid(), "GAME");
    assert!(registry.contains("GAME"));

    let ancestor = resolver.resolve(&page, &button, "^parentVal");
    assert!(ancestor.store.ptr_eq(&page.local_store(&root)));
    assert_eq!(ancestor.store.get(&ancestor.name).unwrap(), Value::from(7));

    let missing = resolver.resolve(&page, &button, "^nowhere");
    assert!(missing.store.ptr_eq(&page.local_store(&button)));

    let css = resolver.resolve(&page, &button, "--accent");
    assert_eq!(css.name, "--accent");
    assert_eq!(css.store.get("--accent").unwrap(), Value::from("teal"));
}

/// Components sharing a context name share one store.
#[test]
fn shared_keys_connect_siblings() {
    let registry = Registry::new();
    let resolver = ScopeResolver::new(&registry);
    let mut page = Page::default();
    let left = page.add(None, Some("board"));
    let right = page.add(None, Some("board"));

    let writer = resolver.resolve(&page, &left, "*turn");
    writer.store.add(&writer.name, "x", false).unwrap();
    let reader = resolver.resolve(&page, &right, "*turn");

    let (seen, cb) = recorder();
    let _sub = reader.store.subscribe(&reader.name, cb).unwrap();
    writer.store.publish(&writer.name, "o").unwrap();

    assert_eq!(*seen.borrow(), [Value::from("x"), Value::from("o")]);
}

// ---- Reconciliation ----

#[derive(Debug)]
struct Row {
    data: Value,
    patches: u32,
}

type RowHandle = Rc<RefCell<Row>>;

#[derive(Default)]
struct Rows {
    destroyed: Vec<Value>,
}

impl ElementFactory for Rows {
    type Element = RowHandle;

    fn instantiate(&mut self, item: &Value) -> RowHandle {
        Rc::new(RefCell::new(Row {
            data: item.clone(),
            patches: 0,
        }))
    }

    fn recycle(&mut self, element: RowHandle) {
        self.destroyed.push(element.borrow().data.clone());
    }

    fn assign(&mut self, element: &RowHandle, _field: &str, _value: &Value) {
        element.borrow_mut().patches += 1;
    }

    fn patch(&mut self, element: &RowHandle, item: &Value) {
        let mut row = element.borrow_mut();
        row.data = item.clone();
        row.patches += 1;
    }
}

fn row_ids(live: &[RowHandle]) -> Vec<String> {
    live.iter()
        .map(|row| row.borrow().data.field("id").map(Value::to_key).unwrap_or_default())
        .collect()
}

/// Dropping the head and appending a new row keeps the survivors.
#[test]
fn keyed_reconcile_drop_head_append_tail() {
    init_tracing();
    let pool: Vec<Value> = (1..=4).map(|id| Value::from(json!({ "id": id }))).collect();
    let mut reconciler = KeyedReconciler::by_field("id");
    let mut live: Vec<RowHandle> = Vec::new();
    let mut rows = Rows::default();

    reconciler
        .reconcile(&mut live, &mut rows, &Value::list(pool[0..3].to_vec()))
        .unwrap();
    let two = Rc::clone(&live[1]);
    let three = Rc::clone(&live[2]);

    let stats = reconciler
        .reconcile(&mut live, &mut rows, &Value::list(pool[1..4].to_vec()))
        .unwrap();

    assert_eq!(row_ids(&live), ["2", "3", "4"]);
    assert!(Rc::ptr_eq(&live[0], &two));
    assert!(Rc::ptr_eq(&live[1], &three));
    assert_eq!(two.borrow().patches, 0);
    assert_eq!(three.borrow().patches, 0);
    assert_eq!(rows.destroyed, [pool[0].clone()]);
    assert_eq!(stats.created, 1);
    assert_eq!(stats.recycled, 1);
    assert_eq!(stats.moved, 0);
}

/// A container that counts structural mutations.
#[derive(Default)]
struct Counting {
    live: Vec<RowHandle>,
    mutations: usize,
}

impl Container for Counting {
    type Element = RowHandle;

    fn len(&self) -> usize {
        self.live.len()
    }

    fn detach(&mut self, range: std::ops::Range<usize>) -> Vec<RowHandle> {
        self.mutations += 1;
        self.live.drain(range).collect()
    }

    fn insert(&mut self, index: usize, elements: Vec<RowHandle>) {
        self.mutations += 1;
        self.live.splice(index..index, elements);
    }

    fn clear(&mut self) -> Vec<RowHandle> {
        self.mutations += 1;
        std::mem::take(&mut self.live)
    }
}

/// Rotating a long list moves one element, not all of them.
#[test]
fn keyed_rotation_is_a_single_move() {
    let pool: Vec<Value> = (0..50).map(|id| Value::from(json!({ "id": id }))).collect();
    let mut reconciler = KeyedReconciler::by_field("id");
    let mut container = Counting::default();
    let mut rows = Rows::default();

    reconciler
        .reconcile(&mut container, &mut rows, &Value::list(pool.clone()))
        .unwrap();
    container.mutations = 0;

    let mut rotated = pool.clone();
    rotated.rotate_left(1);
    let stats = reconciler
        .reconcile(&mut container, &mut rows, &Value::list(rotated))
        .unwrap();

    assert_eq!(stats.moved, 1);
    assert_eq!(container.mutations, 2);
    assert_eq!(row_ids(&container.live).first().map(String::as_str), Some("1"));
    assert_eq!(row_ids(&container.live).last().map(String::as_str), Some("0"));
}

/// A bound view follows a shared store key until unsubscribed.
#[test]
fn list_view_bound_through_resolver() {
    let registry = Registry::new();
    let resolver = ScopeResolver::new(&registry);
    let mut page = Page::default();
    let list = page.add(None, Some("todo"));

    let target = resolver.resolve(&page, &list, "*items");
    target
        .store
        .add(&target.name, json!([{"id": "a"}, {"id": "b"}]), false)
        .unwrap();

    let view = ListView::new(
        KeyedReconciler::by_field("id"),
        Vec::<RowHandle>::new(),
        Rows::default(),
    );
    let (view, sub) = view.bind(&target.store, &target.name).unwrap();
    assert_eq!(row_ids(&view.borrow().container), ["a", "b"]);

    target
        .store
        .publish(&target.name, json!([{"id": "b"}, {"id": "c"}, {"id": "a"}]))
        .unwrap();
    assert_eq!(row_ids(&view.borrow().container), ["b", "c", "a"]);

    sub.remove();
    target.store.publish(&target.name, json!([])).unwrap();
    assert_eq!(view.borrow().container.len(), 3);
}

/// Positional reconciliation keeps elements at their index.
#[test]
fn index_reconcile_keeps_positions() {
    let mut reconciler = IndexReconciler::new();
    let mut live: Vec<RowHandle> = Vec::new();
    let mut rows = Rows::default();

    reconciler
        .reconcile(&mut live, &mut rows, &Value::from(json!([{"id": 1}, {"id": 2}])))
        .unwrap();
    let first = Rc::clone(&live[0]);
    reconciler
        .reconcile(&mut live, &mut rows, &Value::from(json!([{"id": 2}])))
        .unwrap();

    assert!(Rc::ptr_eq(&live[0], &first));
    assert_eq!(row_ids(&live), ["2"]);
    assert_eq!(rows.destroyed.len(), 1);
}
