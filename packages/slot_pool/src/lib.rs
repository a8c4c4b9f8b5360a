#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Thread-safe object pools whose slot occupancy is tracked in packed bitfields.
//!
//! The crate provides two kinds of pool for values of a type `T: Default`:
//!
//! * [`FixedPool`] holds a fixed number of elements, addressed by a flat `usize` index. Its
//!   capacity and element lifecycle callbacks come from a shared [`PoolBehavior`], so many pools
//!   can be created from one description.
//! * [`GrowablePool`] grows by appending fixed-size nodes as it fills up. Elements are addressed
//!   by [`SlotCoordinates`]. Nodes are retained when the pool is cleared, so capacity never
//!   shrinks while the pool exists.
//!
//! Both come in a single-threaded flavor ([`RawFixedPool`], [`RawGrowablePool`]) operated via
//! `&mut self`, and a cloneable thread-safe handle that wraps the raw pool in a mutex. Storage
//! never moves, so element pointers obtained from a pool stay valid until the pool is destroyed.
//!
//! Adding an element resets it to `T::default()` and then runs the init callback. Removing an
//! element runs the destroy callback first. Destroying a pool runs the destroy callback on every
//! element that is still present.
//!
//! A [`PoolRegistry`] issues generation-checked [`Handle`]s to behaviors and pools, bounded by
//! configurable table limits.
//!
//! # Resource exhaustion
//!
//! Running out of slots in a fixed pool, entries in a registry table or memory for a new node is
//! reported as an [`Error`] by default. An [`ExhaustionPolicy::Abort`] policy instead logs a
//! fatal diagnostic and aborts the process.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events: `info` for creation and destruction, `warn` for rejected
//! operations, `debug` for node growth and `error` for fatal diagnostics. No subscriber is
//! installed by the crate.
//!
//! # Examples
//!
//! ```
//! use slot_pool::{GrowablePool, PoolBehavior, PoolRegistry};
//!
//! let registry = PoolRegistry::<u64>::new();
//!
//! let behavior = registry
//!     .create_behavior(
//!         PoolBehavior::builder("counters")
//!             .capacity(4)
//!             .on_init(|index, value| *value = index as u64 * 100)
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let handle = registry.create_fixed_pool("counters-a", behavior).unwrap();
//! let counters = registry.fixed_pool(handle).unwrap();
//!
//! let index = counters.add().unwrap();
//! counters.operate(index, |value| *value += 1).unwrap();
//!
//! let log = GrowablePool::<String>::builder("log").build().unwrap();
//! let line = log.add_with(|_, line| line.push_str("hello")).unwrap();
//! assert_eq!(log.operate(line, |line| line.len()).unwrap(), 5);
//! ```

mod behavior;
mod constants;
mod coordinates;
mod error;
mod exhaustion_policy;
mod fixed_pool;
mod growable_builder;
mod growable_pool;
mod handle_table;
mod info;
mod raw_fixed_pool;
mod raw_growable_pool;
mod registry;
mod slot_bits;
mod slot_block;

pub use behavior::*;
pub use constants::{DEFAULT_MAX_BEHAVIORS, DEFAULT_MAX_POOLS, DEFAULT_NODE_CAPACITY};
pub use coordinates::*;
pub use error::*;
pub use exhaustion_policy::{ExhaustionPolicy, report_fatal};
pub use fixed_pool::*;
pub use growable_builder::*;
pub use growable_pool::*;
pub use handle_table::Handle;
pub(crate) use handle_table::HandleTable;
pub use info::*;
pub use raw_fixed_pool::*;
pub use raw_growable_pool::RawGrowablePool;
pub use registry::*;
pub use slot_bits::{BITS_PER_WORD, map_field_to_index, map_index_to_field};
pub(crate) use slot_bits::SlotBits;
pub(crate) use slot_block::*;
