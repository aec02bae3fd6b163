//! Keyed Reconciliation
//!
//! # Algorithm
//!
//! Each pass runs these steps in order:
//!
//! 1. Empty collection: clear the container and the key map. Done.
//! 2. Same collection reference as last pass: nothing to do.
//! 3. Remove: every key that is no longer present has its element detached
//!    and recycled. Contiguous removals are detached together.
//! 4. Build: walk the new collection. Known keys reuse their element, which is
//!    patched if the item is a different reference than last time. Unknown
//!    keys get a new element.
//! 5. Reposition: take each surviving element's current index in the order of
//!    the new collection, and find the longest increasing subsequence of
//!    those indices. Elements on it are already in the right relative order
//!    and are left alone. The other survivors are detached (adjacent ones
//!    together), then every maximal run of moved or new elements is inserted
//!    as one batch at its final index.
//!
//! A pass costs O(n log n) plus the container's own mutation cost, and makes
//! one detach per group of adjacent displaced elements and one insert per run.
//!
//! The key map mirrors the container order between passes, so the
//! reconciler never has to query the container for positions.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Range;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::{collection_items, Container, ElementFactory, Reconcile, ReconcileStats};
use crate::error::ReconcileError;
use crate::reactive::Value;

struct Slot<E> {
    element: E,
    item: Value,
}

/// Reconciles by item key. See the module docs for the algorithm.
pub struct KeyedReconciler<K, E> {
    key_fn: Box<dyn Fn(&Value) -> K>,
    /// Live elements, in container order.
    entries: IndexMap<K, Slot<E>>,
    previous: Option<Value>,
}

impl<K, E> KeyedReconciler<K, E>
where
    K: Eq + Hash + Clone + Debug,
    E: Clone,
{
    /// A reconciler keyed by `key_fn`, starting with no live elements.
    pub fn new<F>(key_fn: F) -> Self
    where
        F: Fn(&Value) -> K + 'static,
    {
        Self {
            key_fn: Box::new(key_fn),
            entries: IndexMap::new(),
            previous: None,
        }
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live keys in container order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// The live element for `key`.
    pub fn element(&self, key: &K) -> Option<&E> {
        self.entries.get(key).map(|slot| &slot.element)
    }

    fn clear<C, F>(&mut self, container: &mut C, factory: &mut F) -> ReconcileStats
    where
        C: Container<Element = E>,
        F: ElementFactory<Element = E>,
    {
        let detached = container.clear();
        let recycled = detached.len();
        for element in detached {
            factory.recycle(element);
        }
        self.entries.clear();
        ReconcileStats {
            recycled,
            ..ReconcileStats::default()
        }
    }
}

impl<E: Clone> KeyedReconciler<String, E> {
    /// Key map items by one of their fields. Items without the field (and
    /// non-map items) are keyed by their own value.
    pub fn by_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(move |item: &Value| match item.field(&field) {
            Some(key) => key.to_key(),
            None => item.to_key(),
        })
    }
}

impl<K, E> Reconcile<E> for KeyedReconciler<K, E>
where
    K: Eq + Hash + Clone + Debug,
    E: Clone,
{
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

        if items.is_empty() {
            let stats = self.clear(container, factory);
            self.previous = Some(data.clone());
            return Ok(stats);
        }
        if self.previous.as_ref().is_some_and(|prev| prev.same_ref(data)) {
            return Ok(ReconcileStats::default());
        }

        let mut stats = ReconcileStats::default();

        let mut next: IndexMap<K, Value> = IndexMap::with_capacity(items.len());
        for item in items {
            let key = (self.key_fn)(&item);
            if next.insert(key.clone(), item).is_some() {
                warn!(?key, "duplicate key in collection; the last item wins");
            }
        }

        // Remove.
        let gone: Vec<usize> = self
            .entries
            .keys()
            .enumerate()
            .filter(|(_, key)| !next.contains_key(*key))
            .map(|(index, _)| index)
            .collect();
        for range in contiguous(&gone).into_iter().rev() {
            for element in container.detach(range) {
                factory.recycle(element);
                stats.recycled += 1;
            }
        }
        self.entries.retain(|key, _| next.contains_key(key));

        // Build and reuse.
        let mut fresh: HashMap<K, Slot<E>> = HashMap::new();
        for (key, item) in &next {
            match self.entries.get_mut(key) {
                Some(slot) => {
                    if !slot.item.same_ref(item) {
                        factory.patch(&slot.element, item);
                        slot.item = item.clone();
                        stats.patched += 1;
                    }
                }
                None => {
                    let element = factory.instantiate(item);
                    fresh.insert(
                        key.clone(),
                        Slot {
                            element,
                            item: item.clone(),
                        },
                    );
                    stats.created += 1;
                }
            }
        }

        // Reposition. Survivors off the increasing subsequence are detached
        // first, highest positions first so lower ones stay valid. That
        // leaves only stable elements in the container, in their final
        // relative order, so walking runs left to right each run's final
        // index is also its insertion index.
        let next_keys: Vec<&K> = next.keys().collect();
        let current: Vec<Option<usize>> = next_keys
            .iter()
            .map(|key| self.entries.get_index_of(*key))
            .collect();
        let stable = longest_increasing(&current);

        let mut displaced: Vec<usize> = current
            .iter()
            .zip(&stable)
            .filter_map(|(position, keep)| if *keep { None } else { *position })
            .collect();
        displaced.sort_unstable();
        stats.moved = displaced.len();
        for range in contiguous(&displaced).into_iter().rev() {
            container.detach(range);
        }

        let mut cursor = 0;
        while cursor < next_keys.len() {
            if stable[cursor] {
                cursor += 1;
                continue;
            }
            let start = cursor;
            while cursor < next_keys.len() && !stable[cursor] {
                cursor += 1;
            }
            let batch: Vec<E> = next_keys[start..cursor]
                .iter()
                .filter_map(|key| self.entries.get(*key).or_else(|| fresh.get(*key)))
                .map(|slot| slot.element.clone())
                .collect();
            container.insert(start, batch);
            stats.inserts += 1;
        }
        debug_assert_eq!(container.len(), next_keys.len());

        let mut entries = IndexMap::with_capacity(next.len());
        for key in next.into_keys() {
            if let Some(slot) = self.entries.swap_remove(&key).or_else(|| fresh.remove(&key)) {
                entries.insert(key, slot);
            }
        }
        self.entries = entries;
        self.previous = Some(data.clone());

        debug!(?stats, live = self.entries.len(), "keyed reconcile");
        Ok(stats)
    }
}

/// Group sorted indices into contiguous ranges.
fn contiguous(sorted: &[usize]) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for &index in sorted {
        match ranges.last_mut() {
            Some(range) if range.end == index => range.end += 1,
            _ => ranges.push(index..index + 1),
        }
    }
    ranges
}

/// Mark the members of one longest strictly increasing subsequence of the
/// `Some` entries. `None` entries are never marked.
fn longest_increasing(positions: &[Option<usize>]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; positions.len()];

    for (i, pos) in positions.iter().enumerate() {
        if pos.is_none() {
            continue;
        }
        let slot = tails.partition_point(|&t| positions[t] < *pos);
        if slot > 0 {
            prev[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut marked = vec![false; positions.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        marked[i] = true;
        cursor = prev[i];
    }
    marked
}
