//! Weft Core
//!
//! The state layer of the Weft component runtime. It implements:
//!
//! - Reactive stores with synchronous, ordered subscriber notification
//! - Computed properties with dependency tracking and deferred, coalesced
//!   re-notification
//! - A registry of named stores
//! - Scoped property keys (local, shared, ancestor, named, CSS data)
//! - Keyed and positional list reconciliation
//!
//! # Architecture
//!
//! - `reactive`: values, stores, computed properties, scheduler and registry
//! - `scope`: key parsing and store resolution over a component tree
//! - `reconcile`: keeping a live element collection in step with list data
//! - `config`: runtime tunables
//! - `error`: error types
//!
//! Everything is single-threaded. Stores and schedulers are `Rc` handles and
//! must stay on the thread that created them.
//!
//! # Example
//!
//! ```rust
//! use weft_core::reactive::{Registry, Schema, Store, Value};
//!
//! let registry = Registry::new();
//! let cart = registry.register(
//!     Schema::new()
//!         .value("price", 4)
//!         .value("qty", 2)
//!         .computed("total", |s: &Store| {
//!             let price = s.get("price").ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
//!             let qty = s.get("qty").ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
//!             Value::from(price * qty)
//!         }),
//!     Some("cart"),
//! );
//!
//! let _sub = cart.subscribe("total", |v| println!("total: {v}")).unwrap();
//! cart.publish("qty", 3).unwrap();
//! registry.flush(); // prints "total: 12" (the subscribe above printed "total: 8")
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod reconcile;
pub mod scope;

pub use config::RuntimeConfig;
pub use error::{ReconcileError, StoreError};
