use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::constants::ERR_POISONED_LOCK;
use crate::{Error, ExhaustionPolicy, PoolInfo, RawFixedPool, Result};

/// A thread-safe handle to a fixed-capacity pool.
///
/// This wraps a [`RawFixedPool`] in a mutex. The handle is cheap to clone and every clone
/// refers to the same pool. Each operation holds the pool lock for its whole duration,
/// including the time spent in callbacks, so callbacks must not call back into the same pool.
///
/// A pool can be destroyed explicitly through any handle. Every later operation on any handle
/// is rejected with [`Error::Destroyed`] and logged as a warning. A pool that is never destroyed
/// explicitly is destroyed when the last handle is dropped.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use slot_pool::{FixedPool, PoolBehavior, RawFixedPool};
///
/// let behavior = Arc::new(PoolBehavior::<u64>::builder("jobs").capacity(8).build());
/// let pool = FixedPool::from(RawFixedPool::new("jobs", behavior).unwrap());
///
/// let producer = thread::spawn({
///     let pool = pool.clone();
///     move || pool.add_with(|_, value| *value = 5).unwrap()
/// });
///
/// let index = producer.join().unwrap();
/// assert_eq!(pool.operate(index, |value| *value).unwrap(), 5);
///
/// assert!(pool.destroy());
/// assert!(!pool.exists());
/// ```
pub struct FixedPool<T> {
    inner: Arc<FixedPoolInner<T>>,
}

struct FixedPoolInner<T> {
    name: String,
    exhaustion_policy: ExhaustionPolicy,

    /// `None` once the pool has been destroyed.
    state: Mutex<Option<RawFixedPool<T>>>,
}

impl<T: Default> FixedPool<T> {
    /// Wraps a raw pool, applying `exhaustion_policy` when the pool runs out of slots.
    #[must_use]
    pub fn new(pool: RawFixedPool<T>, exhaustion_policy: ExhaustionPolicy) -> Self {
        info!(
            pool = pool.name(),
            behavior = pool.behavior().name(),
            capacity = pool.capacity(),
            element_size = size_of::<T>(),
            "fixed pool created"
        );

        Self {
            inner: Arc::new(FixedPoolInner {
                name: pool.name().to_string(),
                exhaustion_policy,
                state: Mutex::new(Some(pool)),
            }),
        }
    }

    /// Adds a default-valued element, runs the init callback on it and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Full`] if every slot is occupied, unless the exhaustion policy aborts
    /// the process instead. Returns [`Error::Destroyed`] if the pool has been destroyed.
    pub fn add(&self) -> Result<usize> {
        self.with_raw("add", RawFixedPool::add)
    }

    /// Adds a default-valued element, runs the init callback on it and then `f`, and returns
    /// its index.
    ///
    /// This is how a caller initializes an element with its own data while the element is
    /// still invisible to other users of the pool.
    ///
    /// # Errors
    ///
    /// Same as [`add()`][Self::add]. `f` does not run on error.
    pub fn add_with(&self, f: impl FnOnce(usize, &mut T)) -> Result<usize> {
        self.with_raw("add_with", |pool| pool.add_with(f))
    }

    /// Removes the element at `index`, running the destroy callback on it first.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the pool unchanged if the index is out of bounds, the slot
    /// is vacant or the pool has been destroyed.
    pub fn remove_index(&self, index: usize) -> Result<()> {
        self.with_raw("remove_index", |pool| pool.remove_index(index))
    }

    /// Removes the element `ptr` points to, running the destroy callback on it first.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the pool unchanged if the pointer does not address a slot of
    /// this pool, the slot is vacant or the pool has been destroyed.
    pub fn remove_ptr(&self, ptr: NonNull<T>) -> Result<()> {
        self.with_raw("remove_ptr", |pool| pool.remove_ptr(ptr))
    }
}

impl<T> FixedPool<T> {
    /// The name the pool was created with. Remains available after the pool is destroyed.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Translates an index to a pointer to its slot.
    ///
    /// This is the unsynchronized fast path: the pool lock is only held while the address is
    /// computed. The pointer stays valid until the pool is destroyed. Whether the slot is
    /// occupied is not checked, so the caller must know the index is live and that no
    /// synchronized operation touches the element concurrently. Use [`operate()`][Self::operate]
    /// for synchronized access.
    ///
    /// Returns `None` and logs a warning if the index is out of bounds or the pool has been
    /// destroyed.
    #[must_use]
    pub fn get_ptr(&self, index: usize) -> Option<NonNull<T>> {
        self.with_raw("get_ptr", |pool| {
            pool.get_ptr(index).ok_or_else(|| Error::IndexOutOfBounds {
                pool: pool.name().to_string(),
                index,
                capacity: pool.capacity(),
            })
        })
        .ok()
    }

    /// Translates an element pointer back to its slot index.
    ///
    /// Returns `None` if the pointer does not address a slot of this pool or the pool has been
    /// destroyed. Whether the slot is occupied is not checked.
    #[must_use]
    pub fn index_of(&self, ptr: NonNull<T>) -> Option<usize> {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.as_ref().and_then(|pool| pool.index_of(ptr))
    }

    /// Runs `f` on the element at `index` while holding the pool lock and returns its result.
    ///
    /// # Errors
    ///
    /// Returns an error without running `f` if the index is out of bounds, the slot is vacant
    /// or the pool has been destroyed.
    pub fn operate<R>(&self, index: usize, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.with_raw("operate", |pool| pool.operate(index, f))
    }

    /// Runs `f` on every element in ascending index order.
    ///
    /// The pool lock is held for the entire pass, so the set of elements cannot change while
    /// the pass is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Destroyed`] if the pool has been destroyed.
    pub fn iterate(&self, f: impl FnMut(usize, &mut T)) -> Result<()> {
        self.with_raw("iterate", |pool| {
            pool.iterate(f);
            Ok(())
        })
    }

    /// Whether the slot at `index` holds an element.
    ///
    /// Returns `false` for out of range indexes and for destroyed pools.
    #[must_use]
    pub fn is_index_in_use(&self, index: usize) -> bool {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state
            .as_ref()
            .is_some_and(|pool| pool.is_index_in_use(index))
    }

    /// The number of occupied slots, zero after the pool is destroyed.
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.as_ref().map_or(0, RawFixedPool::len)
    }

    /// Whether no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of slots, zero after the pool is destroyed.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.as_ref().map_or(0, RawFixedPool::capacity)
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
        state.as_ref().map(RawFixedPool::info)
    }

    /// Destroys the pool, running the destroy callback on every remaining element and
    /// releasing the storage.
    ///
    /// Pointers obtained from [`get_ptr()`][Self::get_ptr] dangle afterwards.
    ///
    /// Returns `false` and logs a warning if the pool was already destroyed.
    pub fn destroy(&self) -> bool {
        let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);

        let Some(pool) = state.take() else {
            warn!(pool = %self.inner.name, "tried to destroy a fixed pool that no longer exists");
            return false;
        };

        let remaining = pool.len();

        // Runs the destroy callbacks while the lock is still held.
        drop(pool);
        drop(state);

        info!(pool = %self.inner.name, remaining, "fixed pool destroyed");
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
        f: impl FnOnce(&mut RawFixedPool<T>) -> Result<R>,
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
            warn!(pool = %self.inner.name, operation, %error, "fixed pool operation failed");
        }

        result
    }
}

impl<T: Default> From<RawFixedPool<T>> for FixedPool<T> {
    /// Wraps a raw pool with the default exhaustion policy.
    fn from(pool: RawFixedPool<T>) -> Self {
        Self::new(pool, ExhaustionPolicy::default())
    }
}

impl<T> Clone for FixedPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for FixedPool<T> {
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
    use crate::PoolBehavior;

    assert_impl_all!(FixedPool<u64>: Send, Sync, Clone, fmt::Debug);

    fn pool<T: Default>(name: &str, capacity: usize) -> FixedPool<T> {
        let behavior = Arc::new(PoolBehavior::builder(name).capacity(capacity).build());
        FixedPool::from(RawFixedPool::new(name, behavior).unwrap())
    }

    #[test]
    fn clones_share_state() {
        let first = pool::<u32>("shared", 4);
        let second = first.clone();

        let index = first.add_with(|_, value| *value = 11).unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(second.len(), 1);
        assert_eq!(second.operate(index, |value| *value).unwrap(), 11);
    }

    #[test]
    fn full_pool_reports_error() {
        let pool = pool::<u8>("tiny", 2);

        pool.add().unwrap();
        pool.add().unwrap();

        assert!(matches!(pool.add(), Err(Error::Full { capacity: 2, .. })));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn destroy_runs_callbacks_once_per_live_element() {
        let destroyed = Arc::new(AtomicUsize::new(0));

        let behavior = Arc::new(
            PoolBehavior::<u64>::builder("counted")
                .capacity(8)
                .on_destroy({
                    let destroyed = Arc::clone(&destroyed);
                    move |_, _| {
                        destroyed.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .build(),
        );
        let pool = FixedPool::from(RawFixedPool::new("counted", behavior).unwrap());

        let first = pool.add().unwrap();
        pool.add().unwrap();
        pool.add().unwrap();
        pool.remove_index(first).unwrap();
        assert_eq!(destroyed.load(Ordering::Relaxed), 1);

        assert!(pool.destroy());
        assert_eq!(destroyed.load(Ordering::Relaxed), 3);

        assert!(!pool.destroy());
        assert_eq!(destroyed.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn operations_after_destroy_are_rejected() {
        let pool = pool::<u64>("gone", 4);
        let index = pool.add().unwrap();

        assert!(pool.destroy());

        assert!(!pool.exists());
        assert!(matches!(pool.add(), Err(Error::Destroyed { .. })));
        assert!(matches!(
            pool.operate(index, |_| ()),
            Err(Error::Destroyed { .. })
        ));
        assert!(matches!(pool.iterate(|_, _| ()), Err(Error::Destroyed { .. })));
        assert!(pool.get_ptr(index).is_none());
        assert!(!pool.is_index_in_use(index));
        assert!(pool.info().is_none());
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.name(), "gone");
    }

    #[test]
    fn get_ptr_bounds_checked() {
        let pool = pool::<u64>("bounded", 4);

        assert!(pool.get_ptr(3).is_some());
        assert!(pool.get_ptr(4).is_none());
    }

    #[test]
    fn pointer_round_trip() {
        let pool = pool::<u64>("pointers", 4);
        let index = pool.add_with(|_, value| *value = 3).unwrap();

        let ptr = pool.get_ptr(index).unwrap();
        assert_eq!(pool.index_of(ptr), Some(index));

        pool.remove_ptr(ptr).unwrap();
        assert!(!pool.is_index_in_use(index));
        assert!(pool.is_empty());
    }

    #[test]
    fn concurrent_adds_never_share_an_index() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 16;

        let pool = pool::<usize>("contended", THREADS * PER_THREAD);

        let workers = (0..THREADS)
            .map(|thread_index| {
                let pool = pool.clone();
                thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| pool.add_with(|_, value| *value = thread_index).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let mut all = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect::<Vec<_>>();
        all.sort_unstable();
        all.dedup();

        assert_eq!(all.len(), THREADS * PER_THREAD);
        assert_eq!(pool.len(), THREADS * PER_THREAD);
        assert!(pool.add().is_err());
    }

    #[test]
    fn iterate_sees_every_live_element() {
        let pool = pool::<usize>("summed", 10);

        for value in 1..=5 {
            pool.add_with(|_, element| *element = value).unwrap();
        }

        let mut sum = 0;
        pool.iterate(|_, value| sum += *value).unwrap();

        assert_eq!(sum, 15);
    }
}
