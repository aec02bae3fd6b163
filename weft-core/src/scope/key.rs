//! Property-key grammar.
//!
//! | key           | scope                                       |
//! |---------------|---------------------------------------------|
//! | `name`        | the component's own local store             |
//! | `*name`       | the shared store of the component's context |
//! | `^name`       | nearest ancestor whose local store has it   |
//! | `CTX/name`    | the named store `CTX`                       |
//! | `--name`      | local store, seeded from computed style     |
//!
//! Exactly one form applies. The separator form wins over the markers, so
//! `*A/b` names the store `*A`.

/// Prefix of a key in the component's shared context store.
pub const SHARED_MARKER: char = '*';
/// Prefix of a key looked up on the nearest ancestor that has it.
pub const ANCESTOR_MARKER: char = '^';
/// Prefix of a CSS custom property seeded from computed style.
pub const CSS_DATA_MARKER: &str = "--";
/// Separates a store name from a property name.
pub const CONTEXT_SEPARATOR: char = '/';

/// Where a property key resolves, before any store is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRef<'a> {
    /// `name`
    Local(&'a str),
    /// `*name`
    Shared(&'a str),
    /// `^name`
    Ancestor(&'a str),
    /// `context/name`
    Named { context: &'a str, name: &'a str },
    /// Carries the full key, marker included: CSS custom properties keep
    /// their `--` prefix both in the store and in the style lookup.
    CssData(&'a str),
}

impl<'a> ScopeRef<'a> {
    /// Parse a property key. Pure; never fails.
    pub fn parse(key: &'a str) -> Self {
        if let Some((context, name)) = key.split_once(CONTEXT_SEPARATOR) {
            if !context.is_empty() && !name.is_empty() {
                return ScopeRef::Named { context, name };
            }
        }
        if key.starts_with(CSS_DATA_MARKER) {
            return ScopeRef::CssData(key);
        }
        if let Some(name) = key.strip_prefix(SHARED_MARKER) {
            return ScopeRef::Shared(name);
        }
        if let Some(name) = key.strip_prefix(ANCESTOR_MARKER) {
            return ScopeRef::Ancestor(name);
        }
        ScopeRef::Local(key)
    }

    /// The property name inside the resolved store.
    pub fn name(&self) -> &'a str {
        match *self {
            ScopeRef::Local(name)
            | ScopeRef::Shared(name)
            | ScopeRef::Ancestor(name)
            | ScopeRef::CssData(name)
            | ScopeRef::Named { name, .. } => name,
        }
    }
}
