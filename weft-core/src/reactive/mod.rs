//! Reactive Stores
//!
//! This module implements the key/value layer components read and write
//! through: stores, their subscribers, computed properties, and the registry
//! that makes named stores reachable.
//!
//! # Concepts
//!
//! ## Stores
//!
//! A [`Store`] holds named [`Value`]s. Writing a key runs that key's
//! subscribers synchronously, in the order they subscribed, every time.
//!
//! ## Computed Properties
//!
//! A computed key is derived from other keys, possibly in other stores. Reads
//! always re-run the derivation. When a dependency is notified, the computed
//! key's own subscribers are not run right away: a re-notification is queued
//! on the [`Scheduler`] and coalesced with any others for the same key until
//! the next [`Scheduler::flush`].
//!
//! ## Registry
//!
//! The [`Registry`] maps uids to stores and owns the scheduler those stores
//! share.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded: stores are `Rc`-based handles and
//! interior state lives in `RefCell`s that are never borrowed across a
//! subscriber callback.

mod computed;
mod context;
mod registry;
mod scheduler;
mod store;
mod subscriber;
mod value;

pub use computed::{Dependency, Derive};
pub use context::TrackingContext;
pub use registry::Registry;
pub use scheduler::{Scheduler, TaskKey};
pub use store::{Prop, Schema, Store, StoreMode};
pub use subscriber::{SubscriberId, Subscription};
pub use value::{Value, ValueKind, ValueMap};
