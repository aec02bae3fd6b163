//! Deferred Scheduler
//!
//! Computed properties are not re-notified the moment a dependency changes.
//! Instead a task is queued here, keyed by the computed property, and runs
//! when the scheduler is flushed.
//!
//! # Coalescing
//!
//! Scheduling a key that already has a pending task cancels that task and
//! queues the new one at the back. Publishing N dependencies of one computed
//! property before a flush therefore yields exactly one re-notification.
//!
//! # Flushing
//!
//! [`Scheduler::flush`] is the cooperative yield point. It drains the queue in
//! passes: tasks queued while a pass runs (a computed property that depends on
//! another computed property) land in the next pass. The number of passes is
//! capped, so a computed property that transitively depends on itself leaves
//! its task queued for the next flush instead of spinning.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::config::RuntimeConfig;

/// Identifies a deferred task: one per computed property of one store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    store: u64,
    key: String,
}

impl TaskKey {
    /// Key for re-notifying `key` on the store with id `store`.
    pub fn new(store: u64, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Numeric id of the store that owns the computed key.
    pub fn store(&self) -> u64 {
        self.store
    }

    /// The computed property name.
    pub fn key(&self) -> &str {
        &self.key
    }
}

type Task = Box<dyn FnOnce()>;

struct SchedulerInner {
    queue: RefCell<IndexMap<TaskKey, Task>>,
    flushing: Cell<bool>,
    max_passes: usize,
}

/// A coalescing queue of deferred tasks. Cloning yields another handle to the
/// same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    /// An empty queue.
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    pub fn with_config(config: &RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                queue: RefCell::new(IndexMap::new()),
                flushing: Cell::new(false),
                max_passes: config.max_flush_passes.max(1),
            }),
        }
    }

    /// Queue `task` under `key`, replacing any task still pending for it.
    pub fn schedule<F>(&self, key: TaskKey, task: F)
    where
        F: FnOnce() + 'static,
    {
        let mut queue = self.inner.queue.borrow_mut();
        if queue.shift_remove(&key).is_some() {
            trace!(store = key.store, key = %key.key, "replaced pending task");
        } else {
            trace!(store = key.store, key = %key.key, "scheduled task");
        }
        queue.insert(key, Box::new(task));
    }

    /// Drop a pending task without running it.
    pub fn cancel(&self, key: &TaskKey) -> bool {
        self.inner.queue.borrow_mut().shift_remove(key).is_some()
    }

    /// Drop every pending task belonging to `store`.
    pub fn cancel_store(&self, store: u64) {
        self.inner
            .queue
            .borrow_mut()
            .retain(|key, _| key.store != store);
    }

    /// Whether a task is queued under `key`.
    pub fn is_pending(&self, key: &TaskKey) -> bool {
        self.inner.queue.borrow().contains_key(key)
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Run queued tasks until the queue is empty or the pass limit is hit.
    ///
    /// Returns the number of tasks that ran. A flush requested from inside a
    /// running task is ignored; the outer flush picks up whatever it queued.
    pub fn flush(&self) -> usize {
        if self.inner.flushing.replace(true) {
            return 0;
        }

        let mut ran = 0;
        let mut passes = 0;
        loop {
            let batch: Vec<(TaskKey, Task)> = self.inner.queue.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            if passes == self.inner.max_passes {
                warn!(
                    pending = batch.len(),
                    passes, "deferred queue did not settle; leaving tasks for the next flush"
                );
                let mut queue = self.inner.queue.borrow_mut();
                for (key, task) in batch {
                    queue.entry(key).or_insert(task);
                }
                break;
            }
            passes += 1;
            for (_, task) in batch {
                task();
                ran += 1;
            }
        }

        self.inner.flushing.set(false);
        if ran > 0 {
            debug!(ran, passes, "flushed deferred tasks");
        }
        ran
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("max_passes", &self.inner.max_passes)
            .finish()
    }
}
