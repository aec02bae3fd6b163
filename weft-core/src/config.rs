//! Runtime configuration.
//!
//! All knobs have defaults, so an empty JSON object (or no config at all) is a
//! valid configuration.

use serde::{Deserialize, Serialize};

/// Limits and switches shared by a [`Registry`](crate::reactive::Registry) and
/// everything it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RuntimeConfig {
    /// Maximum number of structural parents visited when resolving an
    /// ancestor-scoped key.
    pub max_ancestor_depth: usize,

    /// Maximum number of passes over the deferred queue in one flush.
    /// Guards against computed keys that (transitively) depend on themselves.
    pub max_flush_passes: usize,

    /// Emit a diagnostic when a write changes the primitive type of a value.
    pub warn_on_type_mismatch: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: 256,
            max_flush_passes: 64,
            warn_on_type_mismatch: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
