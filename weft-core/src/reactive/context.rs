//! Tracking Context
//!
//! The tracking context records which properties a computed derivation reads
//! while it runs. That is how implicit dependency sets are discovered.
//!
//! # Implementation
//!
//! A thread-local stack of frames. Evaluating a computed property pushes a
//! frame, every `Store::get` made while the frame is on top records a
//! `(store, key)` pair into it, and the frame is popped when the guard drops.
//! Nested computed reads push their own frame, so each derivation only sees
//! its direct reads.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::computed::Dependency;
use super::SubscriberId;

thread_local! {
    static TRACKING_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

struct Frame {
    owner: SubscriberId,
    reads: SmallVec<[Dependency; 4]>,
}

/// Guard that pops its frame when dropped, even if the derivation panics.
pub struct TrackingContext {
    owner: SubscriberId,
}

impl TrackingContext {
    /// Push a new frame for `owner`.
    pub fn enter(owner: SubscriberId) -> Self {
        TRACKING_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                owner,
                reads: SmallVec::new(),
            });
        });

        Self { owner }
    }

    /// Check if any frame is active.
    pub fn is_active() -> bool {
        TRACKING_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The owner of the innermost frame, if any.
    pub fn current_owner() -> Option<SubscriberId> {
        TRACKING_STACK.with(|stack| stack.borrow().last().map(|frame| frame.owner))
    }

    /// Record a read in the innermost frame. Repeated reads are recorded once.
    pub fn track(dependency: Dependency) {
        TRACKING_STACK.with(|stack| {
            if let Some(frame) = stack.borrow_mut().last_mut() {
                if !frame.reads.contains(&dependency) {
                    frame.reads.push(dependency);
                }
            }
        });
    }

    /// Reads recorded so far in this guard's frame.
    pub fn reads(&self) -> SmallVec<[Dependency; 4]> {
        TRACKING_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|frame| frame.reads.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for TrackingContext {
    fn drop(&mut self) {
        TRACKING_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.owner, self.owner,
                    "TrackingContext mismatch: expected {:?}, got {:?}",
                    self.owner, frame.owner
                );
            }
        });
    }
}
