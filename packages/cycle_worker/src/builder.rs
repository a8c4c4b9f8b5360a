use std::any::type_name;
use std::fmt;
use std::num::NonZero;
use std::time::Duration;

use crate::constants::{DEFAULT_CYCLE_INTERVAL, DEFAULT_TASK_QUEUE_NODE_CAPACITY};
use crate::task::{CycleCallback, OneShot};
use crate::{Result, Worker};

/// Creates a [`Worker`] and starts its thread.
///
/// Only the cycle callback is mandatory. The persistent state defaults to `S::default()`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use cycle_worker::Worker;
///
/// let worker = Worker::<()>::builder("heartbeat")
///     .cycle_interval(Duration::from_millis(5))
///     .on_cycle(|_, _| {})
///     .build()
///     .unwrap();
///
/// assert!(worker.is_alive());
/// assert!(worker.destroy());
/// ```
#[must_use]
pub struct WorkerBuilder<S> {
    pub(crate) name: String,
    pub(crate) cycle_interval: Duration,
    pub(crate) task_queue_node_capacity: NonZero<usize>,
    pub(crate) state: Option<S>,

    pub(crate) on_init: Option<OneShot<S>>,
    pub(crate) on_cycle: Option<CycleCallback<S>>,
    pub(crate) on_exit: Option<OneShot<S>>,
}

impl<S> WorkerBuilder<S> {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            task_queue_node_capacity: DEFAULT_TASK_QUEUE_NODE_CAPACITY,
            state: None,
            on_init: None,
            on_cycle: None,
            on_exit: None,
        }
    }

    /// Sets the time between the starts of two consecutive cycles.
    ///
    /// A zero interval runs cycles back to back.
    pub fn cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    /// Sets how many tasks each node of the task queue holds.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn task_queue_node_capacity(mut self, capacity: usize) -> Self {
        self.task_queue_node_capacity =
            NonZero::new(capacity).expect("task queue node capacity must be non-zero");
        self
    }

    /// Sets the initial value of the persistent state handed to every callback and task.
    pub fn state(mut self, state: S) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets a callback that runs once on the worker thread before the first cycle.
    pub fn on_init(mut self, f: impl FnOnce(&Worker<S>, &S) + Send + 'static) -> Self {
        self.on_init = Some(Box::new(f));
        self
    }

    /// Sets the callback that runs on the worker thread once per cycle while not paused.
    pub fn on_cycle(mut self, f: impl FnMut(&Worker<S>, &S) + Send + 'static) -> Self {
        self.on_cycle = Some(Box::new(f));
        self
    }

    /// Sets a callback that runs once when the worker is destroyed.
    ///
    /// It runs on the worker thread, either at the next cycle boundary after a destroy request
    /// from another thread or immediately if the worker destroys itself.
    pub fn on_exit(mut self, f: impl FnOnce(&Worker<S>, &S) + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(f));
        self
    }
}

impl<S: Default + Send + Sync + 'static> WorkerBuilder<S> {
    /// Creates the task queue, spawns the worker thread and returns a handle to the worker.
    ///
    /// Returns once the thread exists. The init callback runs asynchronously on that thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskQueue`][crate::Error::TaskQueue] if the task queue cannot be created
    /// and [`Error::Spawn`][crate::Error::Spawn] if the operating system refuses to start
    /// the thread.
    ///
    /// # Panics
    ///
    /// Panics if no cycle callback was set.
    pub fn build(self) -> Result<Worker<S>> {
        Worker::start(self)
    }
}

impl<S> fmt::Debug for WorkerBuilder<S> {
    #[cfg_attr(test, mutants::skip)] // We have no API contract here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("cycle_interval", &self.cycle_interval)
            .field("task_queue_node_capacity", &self.task_queue_node_capacity)
            .field("has_state", &self.state.is_some())
            .field("has_on_init", &self.on_init.is_some())
            .field("has_on_cycle", &self.on_cycle.is_some())
            .field("has_on_exit", &self.on_exit.is_some())
            .finish()
    }
}
