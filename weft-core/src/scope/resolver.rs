//! Scope Resolution
//!
//! Turns a property key plus the component asking for it into the concrete
//! store and property name to operate on. Parsing is pure (see
//! [`ScopeRef`]); resolution may lazily create named or shared stores in the
//! registry, or seed a CSS-data key in the local store.
//!
//! The component tree is reached through the [`ScopeTree`] trait, so the
//! resolver works over any structural tree: an arena of nodes, a DOM adapter,
//! or a test fixture.

use std::fmt;

use tracing::{debug, trace, warn};

use super::key::ScopeRef;
use crate::reactive::{Registry, Store, Value};

/// The structural tree collaborator.
pub trait ScopeTree {
    /// A cheap node handle (an index, an `Rc`, ...).
    type Node: Clone;

    /// The structural parent, or `None` at the root.
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// The node's local store, created on first access.
    fn local_store(&self, node: &Self::Node) -> Store;

    /// The node's local store if it already exists, without creating one.
    /// The ancestor walk only ever calls this, so inspecting an ancestor
    /// never gives it a store.
    fn existing_local_store(&self, node: &Self::Node) -> Option<Store>;

    /// The ambient context name used for shared keys. Implementations may
    /// cache it so that it survives detachment from the tree.
    fn context_name(&self, node: &Self::Node) -> Option<String>;

    /// Computed style value for a CSS custom property such as `--accent`.
    fn computed_style(&self, _node: &Self::Node, _property: &str) -> Option<String> {
        None
    }
}

/// A concrete store and the property name inside it.
#[derive(Clone)]
pub struct Resolved {
    pub store: Store,
    /// Property name inside `store`, marker stripped.
    pub name: String,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("store", &self.store.uid())
            .field("name", &self.name)
            .finish()
    }
}

/// Resolves scoped keys against a registry.
pub struct ScopeResolver<'r> {
    registry: &'r Registry,
    max_depth: usize,
}

impl<'r> ScopeResolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            max_depth: registry.config().max_ancestor_depth,
        }
    }

    /// Override the ancestor-walk bound.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Map `key`, as seen from `node`, to a store and property name. Never
    /// fails: every unresolvable form falls back to the node's local store.
    pub fn resolve<T: ScopeTree>(&self, tree: &T, node: &T::Node, key: &str) -> Resolved {
        let scope = ScopeRef::parse(key);
        trace!(key, ?scope, "resolving");

        match scope {
            ScopeRef::Named { context, name } => Resolved {
                store: self.registry.get_or_create(context),
                name: name.to_string(),
            },
            ScopeRef::Shared(name) => match tree.context_name(node) {
                Some(context) => Resolved {
                    store: self.registry.get_or_create(&context),
                    name: name.to_string(),
                },
                None => {
                    warn!(key, "shared key on a component without a context name; using its local store");
                    local(tree, node, name)
                }
            },
            ScopeRef::Ancestor(name) => self
                .find_ancestor(tree, node, name)
                .unwrap_or_else(|| local(tree, node, name)),
            ScopeRef::CssData(name) => {
                let resolved = local(tree, node, name);
                if !resolved.store.has(name) {
                    seed_from_style(tree, node, &resolved.store, name);
                }
                resolved
            }
            ScopeRef::Local(name) => local(tree, node, name),
        }
    }

    fn find_ancestor<T: ScopeTree>(&self, tree: &T, node: &T::Node, name: &str) -> Option<Resolved> {
        let mut current = tree.parent(node);
        let mut depth = 0;
        while let Some(ancestor) = current {
            if depth == self.max_depth {
                debug!(name, depth, "ancestor walk hit its depth bound");
                return None;
            }
            depth += 1;
            if let Some(store) = tree.existing_local_store(&ancestor) {
                if store.has(name) {
                    return Some(Resolved {
                        store,
                        name: name.to_string(),
                    });
                }
            }
            current = tree.parent(&ancestor);
        }
        None
    }
}

fn local<T: ScopeTree>(tree: &T, node: &T::Node, name: &str) -> Resolved {
    Resolved {
        store: tree.local_store(node),
        name: name.to_string(),
    }
}

fn seed_from_style<T: ScopeTree>(tree: &T, node: &T::Node, store: &Store, name: &str) {
    let seed = tree
        .computed_style(node, name)
        .map(|raw| Value::from(raw.trim()))
        .unwrap_or(Value::Null);
    trace!(name, %seed, "seeding css data");
    let _ = store.add(name, seed, false);
}
