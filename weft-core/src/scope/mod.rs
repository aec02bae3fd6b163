//! Scoped Property Keys
//!
//! Components address properties with prefixed keys. [`ScopeRef::parse`]
//! classifies a key; [`ScopeResolver::resolve`] maps it to a concrete store.

mod key;
mod resolver;

pub use key::{ScopeRef, ANCESTOR_MARKER, CONTEXT_SEPARATOR, CSS_DATA_MARKER, SHARED_MARKER};
pub use resolver::{Resolved, ScopeResolver, ScopeTree};
