#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Named background threads that run a callback on a fixed cycle.
//!
//! A [`Worker`] owns one thread. Every `cycle_interval`, the thread takes the worker's cycle
//! lock, runs the tasks that other threads have dispatched to it since the previous cycle and
//! then runs the cycle callback, unless the worker is paused. Dispatched tasks are kept in a
//! [`slot_pool::GrowablePool`] until the next cycle drains it.
//!
//! Callbacks and tasks receive the worker handle and a shared persistent state of type `S`,
//! created from `S::default()` unless given to the builder.
//!
//! Waiting for a dispatched task to complete uses tickets: [`Worker::dispatch_task()`] returns
//! the number of cycles completed so far and [`Worker::wait_for_cycle()`] blocks until the next
//! cycle has completed.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events: `info` when a worker starts and terminates, `warn` for
//! operations rejected after termination, `debug` for pause changes and `trace` for every
//! completed cycle.
//!
//! # Example
//!
//! ```
//! use std::sync::Mutex;
//! use std::time::Duration;
//!
//! use cycle_worker::Worker;
//!
//! let worker = Worker::<Mutex<Vec<u32>>>::builder("collector")
//!     .cycle_interval(Duration::from_millis(2))
//!     .on_cycle(|_, _| {})
//!     .build()
//!     .unwrap();
//!
//! let mut ticket = 0;
//! for value in 1..=3 {
//!     ticket = worker
//!         .dispatch_task(move |_, values| values.lock().unwrap().push(value))
//!         .unwrap();
//! }
//!
//! assert!(worker.wait_for_cycle(ticket, Duration::from_secs(10)));
//! assert_eq!(*worker.state().lock().unwrap(), vec![1, 2, 3]);
//!
//! assert!(worker.destroy());
//! ```

mod builder;
mod constants;
mod error;
mod task;
mod worker;

pub use builder::*;
pub use constants::{DEFAULT_CYCLE_INTERVAL, DEFAULT_TASK_QUEUE_NODE_CAPACITY};
pub use error::*;
pub use worker::*;
