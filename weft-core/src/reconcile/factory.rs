//! Element creation, patching and recycling.

use crate::reactive::Value;

/// Field name used when patching a non-map item.
pub const ITEM_FIELD: &str = "item";

/// Turns data items into live elements.
///
/// Elements are handles (`Rc`s, ids, ...): the reconciler keeps one clone in
/// its key map and hands another to the container, and both must refer to
/// the same live element.
pub trait ElementFactory {
    type Element: Clone;

    /// Create an element for a new item.
    fn instantiate(&mut self, item: &Value) -> Self::Element;

    /// Release an element whose item left the collection.
    fn recycle(&mut self, element: Self::Element);

    /// Set one field on an element.
    fn assign(&mut self, element: &Self::Element, field: &str, value: &Value);

    /// Bring an element up to date with a changed item.
    ///
    /// The default assigns field by field (the whole item under
    /// [`ITEM_FIELD`] when it is not a map). Override it when elements accept
    /// a batch update.
    fn patch(&mut self, element: &Self::Element, item: &Value) {
        match item.as_map() {
            Some(fields) => {
                for (field, value) in fields {
                    self.assign(element, field, value);
                }
            }
            None => self.assign(element, ITEM_FIELD, item),
        }
    }
}
