//! List Reconciliation
//!
//! A reconciler keeps a live ordered collection of elements in step with an
//! ordered data collection, a [`Value::List`] (or a [`Value::Map`], taken in
//! insertion order). Two strategies are provided:
//!
//! - [`KeyedReconciler`] matches items by a key function. Elements follow
//!   their key: they are reused, patched when their item changed, and moved
//!   in batches when the order changed. An element is never destroyed while
//!   its key is still present.
//! - [`IndexReconciler`] matches items by position. Cheaper, but a reorder
//!   becomes a series of patches, so per-element transient state (focus,
//!   scroll) stays with the position rather than the item.
//!
//! Both are driven either directly, via [`Reconcile::reconcile`], or through
//! a store subscription with [`ListView::bind`].

mod container;
mod factory;
mod indexed;
mod keyed;

pub use container::Container;
pub use factory::{ElementFactory, ITEM_FIELD};
pub use indexed::IndexReconciler;
pub use keyed::KeyedReconciler;

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use crate::error::{ReconcileError, StoreError};
use crate::reactive::{Store, Subscription, Value};

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Elements instantiated.
    pub created: usize,
    /// Elements recycled.
    pub recycled: usize,
    /// Elements patched in place.
    pub patched: usize,
    /// Pre-existing elements that changed position.
    pub moved: usize,
    /// Insert calls made on the container.
    pub inserts: usize,
}

impl ReconcileStats {
    /// `true` when the pass left the container untouched.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// A reconciliation strategy.
pub trait Reconcile<E> {
    /// Bring `container` in line with `data`.
    ///
    /// If `data` is not a list or map, a diagnostic is logged, the container
    /// is left exactly as it was and an error is returned.
    fn reconcile<C, F>(
        &mut self,
        container: &mut C,
        factory: &mut F,
        data: &Value,
    ) -> Result<ReconcileStats, ReconcileError>
    where
        C: Container<Element = E>,
        F: ElementFactory<Element = E>;
}

/// The items of a data collection, or the diagnostic for a non-collection.
pub(crate) fn collection_items(data: &Value) -> Result<Vec<Value>, ReconcileError> {
    match data {
        Value::List(items) => Ok(items.as_ref().clone()),
        Value::Map(map) => Ok(map.values().cloned().collect()),
        other => {
            let err = ReconcileError::NotACollection(other.kind());
            warn!("{err}; leaving the container unchanged");
            Err(err)
        }
    }
}

/// A reconciler together with the container it drives and the factory it
/// builds elements with.
pub struct ListView<R, C, F> {
    pub reconciler: R,
    /// The live collection.
    pub container: C,
    pub factory: F,
}

impl<R, C, F> ListView<R, C, F>
where
    C: Container,
    F: ElementFactory<Element = C::Element>,
    R: Reconcile<C::Element>,
{
    pub fn new(reconciler: R, container: C, factory: F) -> Self {
        Self {
            reconciler,
            container,
            factory,
        }
    }

    /// Run one pass against `data`.
    pub fn update(&mut self, data: &Value) -> Result<ReconcileStats, ReconcileError> {
        self.reconciler
            .reconcile(&mut self.container, &mut self.factory, data)
    }

    /// Drive this view from a list-valued store key.
    ///
    /// The view is reconciled against the key's current value immediately
    /// and again on every notification. A notification that arrives while
    /// the view is already reconciling (a factory publishing back into the
    /// same key) is dropped with a diagnostic.
    pub fn bind(self, store: &Store, key: &str) -> Result<(Rc<RefCell<Self>>, Subscription), StoreError>
    where
        R: 'static,
        C: 'static,
        F: 'static,
    {
        let view = Rc::new(RefCell::new(self));
        let target = Rc::clone(&view);
        let bound_key = key.to_string();
        let subscription = store.subscribe(key, move |value| match target.try_borrow_mut() {
            Ok(mut view) => {
                let _ = view.update(value);
            }
            Err(_) => warn!(key = %bound_key, "list view is already reconciling; skipping nested update"),
        })?;
        Ok((view, subscription))
    }
}
