//! Deferred, single-fire dispatch.
//!
//! Two orthogonal capabilities:
//!
//! - [`SingleFire`] guarantees a callback runs at most once
//! - [`Scheduler`] guarantees work runs later, never inside the call stack
//!   that queued it
//!
//! [`Deferred`] combines both: the first `invoke` claims the callback and
//! queues it on the scheduler, every later `invoke` is a no-op.

use crate::error::{CoreError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks outside the current call stack.
pub trait Scheduler: Send + Sync {
    /// Queue a task. It must not run before `defer` returns.
    fn defer(&self, task: Task);
}

/// Scheduler that spawns tasks onto a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Scheduler for the runtime the caller is running on.
    ///
    /// Fails when called outside of a tokio runtime.
    pub fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| CoreError::no_runtime(e.to_string()))
    }

    /// Scheduler for an explicit runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn defer(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }
}

/// Manually driven FIFO scheduler.
///
/// Nothing runs until the owner calls [`QueueScheduler::run_pending`], which
/// makes it the natural fit for hand-written event loops and deterministic
/// tests.
#[derive(Clone, Default)]
pub struct QueueScheduler {
    queue: Arc<Mutex<VecDeque<Task>>>,
}

impl QueueScheduler {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks being run. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Scheduler for QueueScheduler {
    fn defer(&self, task: Task) {
        self.queue.lock().push_back(task);
    }
}

impl fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// A callback that runs at most once.
pub struct SingleFire<T> {
    slot: Mutex<Option<Callback<T>>>,
}

impl<T> SingleFire<T> {
    /// Wrap a callback
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            slot: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Run the callback now if it has not run yet. Returns whether it ran.
    pub fn fire(&self, value: T) -> bool {
        match self.take() {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    /// Whether the callback has been claimed.
    pub fn is_spent(&self) -> bool {
        self.slot.lock().is_none()
    }

    fn take(&self) -> Option<Callback<T>> {
        self.slot.lock().take()
    }
}

impl<T> fmt::Debug for SingleFire<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFire")
            .field("spent", &self.is_spent())
            .finish()
    }
}

/// A single-fire callback whose one invocation is deferred onto a scheduler.
pub struct Deferred<T> {
    callback: SingleFire<T>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T: Send + 'static> Deferred<T> {
    /// Wrap a callback
    pub fn new<F>(scheduler: Arc<dyn Scheduler>, callback: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            callback: SingleFire::new(callback),
            scheduler,
        }
    }

    /// Queue the callback with `value` unless it was already queued.
    ///
    /// Returns whether this call queued it.
    pub fn invoke(&self, value: T) -> bool {
        match self.callback.take() {
            Some(callback) => {
                self.scheduler.defer(Box::new(move || callback(value)));
                true
            }
            None => false,
        }
    }

    /// Whether the callback has been queued.
    pub fn is_spent(&self) -> bool {
        self.callback.is_spent()
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("callback", &self.callback)
            .finish_non_exhaustive()
    }
}
