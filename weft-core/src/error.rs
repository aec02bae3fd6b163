//! Error types.
//!
//! Nothing in this crate panics or unwinds on bad input. Every failing
//! operation logs a diagnostic through `tracing` and hands the same condition
//! back as an `Err`, which callers are free to ignore.

use thiserror::Error;

use crate::reactive::ValueKind;

/// A diagnostic raised by a store operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Read, publish or subscribe on a key a strict store does not own.
    #[error("unknown property `{key}` in store `{store}`")]
    UnknownProperty { store: String, key: String },

    /// A plain value was published to a computed key.
    #[error("property `{key}` in store `{store}` is computed; only a derivation can replace it")]
    ComputedWrite { store: String, key: String },

    /// `redefine` was called for a key that is not computed.
    #[error("property `{key}` in store `{store}` is not computed")]
    NotComputed { store: String, key: String },

    /// The store was torn down or removed from its registry.
    #[error("store `{store}` has been torn down")]
    TornDown { store: String },

    /// Returned by `Registry::register` when the uid is taken. The existing
    /// store is still handed back alongside this diagnostic.
    #[error("store `{uid}` is already registered")]
    DuplicateRegistration { uid: String },

    /// Returned by `Registry::get` for an unknown uid.
    #[error("no store registered as `{uid}`")]
    UnknownStore { uid: String },
}

/// Soft type-consistency warning. Never returned as an error; the write goes
/// through regardless.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("type of `{key}` changed from {previous} to {next}")]
pub struct TypeMismatch {
    pub key: String,
    /// Type of the value being replaced.
    pub previous: ValueKind,
    /// Type of the value written.
    pub next: ValueKind,
}

/// A diagnostic raised by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    /// The data collection was neither a list nor a keyed map.
    #[error("expected a list or keyed map, got {0}")]
    NotACollection(ValueKind),
}
