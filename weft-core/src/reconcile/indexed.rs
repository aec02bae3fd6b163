//! Positional reconciliation: element `i` always renders item `i`.

use tracing::debug;

use super::{collection_items, Container, ElementFactory, Reconcile, ReconcileStats};
use crate::error::ReconcileError;
use crate::reactive::Value;

struct Slot<E> {
    element: E,
    item: Value,
}

/// Reconciles by position. Never moves an element: a shorter collection
/// trims the tail, a longer one appends, and everything in between is
/// patched when its item changed.
pub struct IndexReconciler<E> {
    slots: Vec<Slot<E>>,
    previous: Option<Value>,
}

impl<E: Clone> IndexReconciler<E> {
    /// A reconciler with no live elements.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            previous: None,
        }
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The live element at `index`.
    pub fn element(&self, index: usize) -> Option<&E> {
        self.slots.get(index).map(|slot| &slot.element)
    }
}

impl<E: Clone> Default for IndexReconciler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Reconcile<E> for IndexReconciler<E> {
    fn reconcile<C, F>(
        &mut self,
        container: &mut C,
        factory: &mut F,
        data: &Value,
    ) -> Result<ReconcileStats, ReconcileError>
    where
        C: Container<Element = E>,
        F: ElementFactory<Element = E>,
    {
        let items = collection_items(data)?;
        let mut stats = ReconcileStats::default();

        if items.is_empty() {
            for element in container.clear() {
                factory.recycle(element);
                stats.recycled += 1;
            }
            self.slots.clear();
            self.previous = Some(data.clone());
            return Ok(stats);
        }
        if self.previous.as_ref().is_some_and(|prev| prev.same_ref(data)) {
            return Ok(stats);
        }

        let old_len = self.slots.len();
        let new_len = items.len();

        for (slot, item) in self.slots.iter_mut().zip(&items) {
            if !slot.item.same_ref(item) {
                factory.patch(&slot.element, item);
                slot.item = item.clone();
                stats.patched += 1;
            }
        }

        if new_len < old_len {
            for element in container.detach(new_len..old_len) {
                factory.recycle(element);
                stats.recycled += 1;
            }
            self.slots.truncate(new_len);
        } else if new_len > old_len {
            let mut batch = Vec::with_capacity(new_len - old_len);
            for item in &items[old_len..] {
                let element = factory.instantiate(item);
                batch.push(element.clone());
                self.slots.push(Slot {
                    element,
                    item: item.clone(),
                });
                stats.created += 1;
            }
            container.insert(old_len, batch);
            stats.inserts += 1;
        }

        self.previous = Some(data.clone());
        debug!(?stats, live = self.slots.len(), "indexed reconcile");
        Ok(stats)
    }
}
