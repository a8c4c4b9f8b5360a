use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::constants::ERR_POISONED_LOCK;
use crate::{
    Error, ExhaustionPolicy, GrowablePoolBuilder, PoolInfo, RawGrowablePool, Result,
    SlotCoordinates,
};

/// A thread-safe handle to a pool that grows on demand.
///
/// This wraps a [`RawGrowablePool`] in a mutex. The handle is cheap to clone and every clone
/// refers to the same pool. Each operation holds the pool lock for its whole duration,
/// including the time spent in callbacks, so callbacks must not call back into the same pool.
///
/// After [`destroy()`][Self::destroy], every operation on any handle is rejected with
/// [`Error::Destroyed`] and logged as a warning.
///
/// # Example
///
/// ```
/// use slot_pool::GrowablePool;
///
/// let pool = GrowablePool::<u64>::builder("samples")
///     .node_capacity(4)
///     .build()
///     .unwrap();
///
/// for value in 0..10 {
///     pool.add_with(|_, element| *element = value).unwrap();
/// }
///
/// let mut total = 0;
/// pool.iterate(|_, element| total += *element).unwrap();
///
/// assert_eq!(total, 45);
/// assert_eq!(pool.node_count(), 3);
/// ```
pub struct GrowablePool<T> {
    inner: Arc<GrowablePoolInner<T>>,
}

struct GrowablePoolInner<T> {
    name: String,
    exhaustion_policy: ExhaustionPolicy,

    /// `None` once the pool has been destroyed.
    state: Mutex<Option<RawGrowablePool<T>>>,
}

impl<T> GrowablePool<T> {
    /// Creates a builder for a pool with the given name.
    pub fn builder(name: impl Into<String>) -> GrowablePoolBuilder<T> {
        GrowablePoolBuilder::new(name.into())
    }
}

impl<T: Default> GrowablePool<T> {
    pub(crate) fn new(pool: RawGrowablePool<T>, exhaustion_policy: ExhaustionPolicy) -> Self {
        info!(
            pool = pool.name(),
            node_capacity = pool.node_capacity(),
            element_size = size_of::<T>(),
            "growable pool created"
        );

        Self {
            inner: Arc::new(GrowablePoolInner {
                name: pool.name().to_string(),
                exhaustion_policy,
                state: Mutex::new(Some(pool)),
            }),
        }
    }

    /// Adds a default-valued element, runs the init callback on it and returns its coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the pool needs a new node and it cannot be
    /// allocated, unless the exhaustion policy aborts the process instead. Returns
    /// [`Error::Destroyed`] if the pool has been destroyed.
    pub fn add(&self) -> Result<SlotCoordinates> {
        self.with_raw("add", RawGrowablePool::add)
    }

    /// Adds a default-valued element, runs the init callback on it and then `f`, and returns
    /// its coordinates.
    ///
    /// # Errors
    ///
    /// Same as [`add()`][Self::add]. `f` does not run on error.
    pub fn add_with(&self, f: impl FnOnce(SlotCoordinates, &mut T)) -> Result<SlotCoordinates> {
        self.with_raw("add_with", |pool| pool.add_with(f))
    }

    /// Removes the element at `coordinates`, running the destroy callback on it first.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the pool unchanged if the coordinates lie outside the pool,
    /// the slot is vacant or the pool has been destroyed.
    pub fn remove(&self, coordinates: SlotCoordinates) -> Result<()> {
        self.with_raw("remove", |pool| pool.remove(coordinates))
    }

    /// Removes the element `ptr` points to, running the destroy callback on it first.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the pool unchanged if no node contains the pointer, the slot
    /// is vacant or the pool has been destroyed.
    pub fn remove_ptr(&self, ptr: NonNull<T>) -> Result<()> {
        self.with_raw("remove_ptr", |pool| pool.remove_ptr(ptr))
    }

    /// Removes every element, running the destroy callback on each. The nodes are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Destroyed`] if the pool has been destroyed.
    pub fn clear(&self) -> Result<()> {
        self.with_raw("clear", |pool| {
            pool.clear();
            Ok(())
        })
    }
}

impl<T> GrowablePool<T> {
    /// The name the pool was created with. Remains available after the pool is destroyed.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Translates coordinates to a pointer to the slot without checking whether it is occupied.
    ///
    /// The pointer stays valid until the pool is destroyed. See
    /// [`FixedPool::get_ptr()`][crate::FixedPool::get_ptr] for the access rules.
    ///
    /// Returns `None` and logs a warning if the coordinates lie outside the pool or the pool
    /// has been destroyed.
    #[must_use]
    pub fn get_ptr(&self, coordinates: SlotCoordinates) -> Option<NonNull<T>> {
        self.with_raw("get_ptr", |pool| {
            let capacity = pool.capacity();

            pool.get_ptr(coordinates)
                .ok_or_else(|| Error::IndexOutOfBounds {
                    pool: pool.name().to_string(),
                    index: coordinates.node_index(),
                    capacity,
                })
        })
        .ok()
    }

    /// Finds the coordinates of the slot `ptr` points to.
    ///
    /// Returns `None` if no node contains the pointer or the pool has been destroyed.
    #[must_use]
    pub fn coordinates_of(&self, ptr: NonNull<T>) -> Option<SlotCoordinates> {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.as_ref().and_then(|pool| pool.coordinates_of(ptr))
    }

    /// Runs `f` on the element at `coordinates` while holding the pool lock and returns its
    /// result.
    ///
    /// # Errors
    ///
    /// Returns an error without running `f` if the coordinates lie outside the pool, the slot
    /// is vacant or the pool has been destroyed.
    pub fn operate<R>(&self, coordinates: SlotCoordinates, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.with_raw("operate", |pool| pool.operate(coordinates, f))
    }

    /// Runs `f` on every element in chain order.
    ///
    /// The pool lock is held for the entire pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Destroyed`] if the pool has been destroyed.
    pub fn iterate(&self, f: impl FnMut(SlotCoordinates, &mut T)) -> Result<()> {
        self.with_raw("iterate", |pool| {
            pool.iterate(f);
            Ok(())
        })
    }

    /// Whether the slot at `coordinates` holds an element. `false` for destroyed pools.
    #[must_use]
    pub fn is_in_use(&self, coordinates: SlotCoordinates) -> bool {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.as_ref().is_some_and(|pool| pool.is_in_use(coordinates))
    }

    /// The number of elements in the pool, zero after the pool is destroyed.
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.as_ref().map_or(0, RawGrowablePool::len)
    }

    /// Whether the pool holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of nodes, zero after the pool is destroyed.
    #[must_use]
    pub fn node_count(&self) -> usize {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.as_ref().map_or(0, RawGrowablePool::node_count)
    }

    /// The total number of slots across all nodes, zero after the pool is destroyed.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.as_ref().map_or(0, RawGrowablePool::capacity)
    }

    /// Whether the pool has not been destroyed.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.inner.state.lock().expect(ERR_POISONED_LOCK).is_some()
    }

    /// A snapshot of the pool's metadata, or `None` if the pool has been destroyed.
    #[must_use]
    pub fn info(&self) -> Option<PoolInfo> {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.as_ref().map(RawGrowablePool::info)
    }

    /// Destroys the pool, running the destroy callback on every remaining element and
    /// releasing every node.
    ///
    /// Returns `false` and logs a warning if the pool was already destroyed.
    pub fn destroy(&self) -> bool {
        let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);

        let Some(pool) = state.take() else {
            warn!(pool = %self.inner.name, "tried to destroy a growable pool that no longer exists");
            return false;
        };

        let remaining = pool.len();
        let node_count = pool.node_count();

        // Runs the destroy callbacks while the lock is still held.
        drop(pool);
        drop(state);

        info!(pool = %self.inner.name, remaining, node_count, "growable pool destroyed");
        true
    }

    /// Whether both handles refer to the same pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn with_raw<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut RawGrowablePool<T>) -> Result<R>,
    ) -> Result<R> {
        let result = {
            let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);

            match state.as_mut() {
                Some(pool) => f(pool),
                None => Err(Error::Destroyed {
                    pool: self.inner.name.clone(),
                }),
            }
        };

        let result = self.inner.exhaustion_policy.enforce(operation, result);

        if let Err(error) = &result {
            warn!(pool = %self.inner.name, operation, %error, "growable pool operation failed");
        }

        result
    }
}

impl<T> Clone for GrowablePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for GrowablePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.inner.name)
            .field("exhaustion_policy", &self.inner.exhaustion_policy)
            .field("state", &self.inner.state)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(GrowablePool<u64>: Send, Sync, Clone, fmt::Debug);

    #[test]
    fn grows_under_concurrent_producers() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 50;

        let pool = GrowablePool::<usize>::builder("concurrent")
            .node_capacity(16)
            .build()
            .unwrap();

        let producers = (0..THREADS)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for value in 0..PER_THREAD {
                        pool.add_with(|_, element| *element = value).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(pool.len(), THREADS * PER_THREAD);
        assert!(pool.capacity() >= THREADS * PER_THREAD);
        assert_eq!(pool.node_count(), (THREADS * PER_THREAD).div_ceil(16));
    }

    #[test]
    fn destroy_runs_callbacks_and_invalidates() {
        let destroyed = Arc::new(AtomicUsize::new(0));

        let pool = GrowablePool::<u8>::builder("doomed")
            .node_capacity(2)
            .on_destroy({
                let destroyed = Arc::clone(&destroyed);
                move |_, _| {
                    destroyed.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build()
            .unwrap();

        for _ in 0..5 {
            pool.add().unwrap();
        }

        assert!(pool.destroy());
        assert_eq!(destroyed.load(Ordering::Relaxed), 5);

        assert!(!pool.destroy());
        assert!(!pool.exists());
        assert!(matches!(pool.add(), Err(Error::Destroyed { .. })));
        assert!(matches!(pool.clear(), Err(Error::Destroyed { .. })));
        assert_eq!(pool.node_count(), 0);
        assert!(pool.info().is_none());
    }

    #[test]
    fn clear_keeps_capacity() {
        let pool = GrowablePool::<u32>::builder("recycled")
            .node_capacity(4)
            .build()
            .unwrap();

        for _ in 0..9 {
            pool.add().unwrap();
        }
        assert_eq!(pool.node_count(), 3);

        pool.clear().unwrap();

        assert!(pool.is_empty());
        assert_eq!(pool.node_count(), 3);
        assert_eq!(pool.capacity(), 12);
    }

    #[test]
    fn pointer_lookup_and_removal() {
        let pool = GrowablePool::<u64>::builder("located")
            .node_capacity(2)
            .build()
            .unwrap();

        let coordinates = (0..3).map(|_| pool.add().unwrap()).collect::<Vec<_>>();
        let last = *coordinates.last().unwrap();

        let ptr = pool.get_ptr(last).unwrap();
        assert_eq!(pool.coordinates_of(ptr), Some(last));

        pool.remove_ptr(ptr).unwrap();
        assert!(!pool.is_in_use(last));
        assert_eq!(pool.len(), 2);

        assert!(pool.get_ptr(SlotCoordinates::new(9, 0)).is_none());
    }

    #[test]
    fn info_snapshot() {
        let pool = GrowablePool::<u16>::builder("described")
            .node_capacity(8)
            .build()
            .unwrap();

        pool.add().unwrap();

        let info = pool.info().unwrap();

        assert_eq!(info.name, "described");
        assert_eq!(info.len, 1);
        assert_eq!(info.capacity, 8);
        assert_eq!(info.node_count, 1);
        assert_eq!(info.element_size, 2);
    }
}
