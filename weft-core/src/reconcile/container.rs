//! The live collection being reconciled.

use std::ops::Range;

/// An ordered, mutable collection of live elements (a parent node's children,
/// a row list, ...). Reconcilers only ever touch it through these methods,
/// and every call is one structural mutation.
pub trait Container {
    type Element;

    /// Number of live elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach a contiguous run of elements, returning them in order.
    fn detach(&mut self, range: Range<usize>) -> Vec<Self::Element>;

    /// Insert a run of elements so the first lands at `index`.
    fn insert(&mut self, index: usize, elements: Vec<Self::Element>);

    /// Detach everything.
    fn clear(&mut self) -> Vec<Self::Element>;
}

impl<E> Container for Vec<E> {
    type Element = E;

    fn len(&self) -> usize {
        <[E]>::len(self)
    }

    fn detach(&mut self, range: Range<usize>) -> Vec<E> {
        self.drain(range).collect()
    }

    fn insert(&mut self, index: usize, elements: Vec<E>) {
        self.splice(index..index, elements);
    }

    fn clear(&mut self) -> Vec<E> {
        std::mem::take(self)
    }
}
