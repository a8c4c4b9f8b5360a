use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::constants::{DEFAULT_MAX_BEHAVIORS, DEFAULT_MAX_POOLS, ERR_POISONED_LOCK};
use crate::{
    ExhaustionPolicy, FixedPool, GrowablePool, GrowablePoolBuilder, Handle, HandleTable,
    PoolBehavior, PoolInfo, RawFixedPool, Result,
};

/// Handle to a behavior registered with [`PoolRegistry::create_behavior()`].
pub type BehaviorHandle<T> = Handle<Arc<PoolBehavior<T>>>;

/// Handle to a pool created with [`PoolRegistry::create_fixed_pool()`].
pub type FixedPoolHandle<T> = Handle<FixedPool<T>>;

/// Handle to a pool created with [`PoolRegistry::create_growable_pool()`].
pub type GrowablePoolHandle<T> = Handle<GrowablePool<T>>;

/// Issues and resolves handles to pool behaviors and pools.
///
/// The registry owns bounded tables of behaviors, fixed-capacity pools and growable pools, and
/// hands out [`Handle`]s to them. Handles are generation-checked: a handle to a destroyed pool
/// never resolves again, even after its table slot has been reused.
///
/// Behaviors cannot be removed once registered. Pools can be destroyed through the registry,
/// which removes them from the table, or through any pool handle, in which case the table
/// keeps resolving to the destroyed pool until it is destroyed through the registry as well.
///
/// Every pool created by the registry inherits the registry's [`ExhaustionPolicy`].
///
/// The registry is thread-safe. Share it between threads by reference or wrap it in an [`Arc`].
///
/// # Examples
///
/// ```
/// use slot_pool::{PoolBehavior, PoolRegistry};
///
/// let registry = PoolRegistry::<u64>::builder().build();
///
/// let behavior = registry
///     .create_behavior(PoolBehavior::builder("sessions").capacity(32).build())
///     .unwrap();
///
/// let handle = registry.create_fixed_pool("sessions-eu", behavior).unwrap();
/// let pool = registry.fixed_pool(handle).unwrap();
///
/// let index = pool.add_with(|_, value| *value = 7).unwrap();
/// assert!(pool.is_index_in_use(index));
///
/// assert!(registry.destroy_fixed_pool(handle));
/// assert!(registry.fixed_pool(handle).is_none());
/// ```
pub struct PoolRegistry<T> {
    exhaustion_policy: ExhaustionPolicy,
    created_at: Instant,

    behaviors: Mutex<HandleTable<Arc<PoolBehavior<T>>>>,
    fixed_pools: Mutex<HandleTable<FixedPool<T>>>,
    growable_pools: Mutex<HandleTable<GrowablePool<T>>>,
}

impl<T> PoolRegistry<T> {
    /// Creates a registry with the default limits and exhaustion policy.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for a registry with custom limits or exhaustion policy.
    pub fn builder() -> PoolRegistryBuilder<T> {
        PoolRegistryBuilder::new()
    }

    /// The exhaustion policy inherited by every pool of this registry.
    #[must_use]
    #[inline]
    pub fn exhaustion_policy(&self) -> ExhaustionPolicy {
        self.exhaustion_policy
    }

    /// Time elapsed since the registry was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Registers a behavior and returns a handle for creating fixed-capacity pools from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfHandles`][crate::Error::OutOfHandles] if the registry already holds
    /// the maximum number of behaviors, unless the exhaustion policy aborts the process instead.
    pub fn create_behavior(&self, behavior: PoolBehavior<T>) -> Result<BehaviorHandle<T>> {
        let name = behavior.name().to_string();
        let capacity = behavior.capacity();

        let result = self
            .behaviors
            .lock()
            .expect(ERR_POISONED_LOCK)
            .insert(Arc::new(behavior));

        let handle = self.enforce("create_behavior", &name, result)?;

        info!(
            behavior = %name,
            capacity,
            element_size = size_of::<T>(),
            "pool behavior registered"
        );

        Ok(handle)
    }

    /// The behavior a handle refers to.
    ///
    /// Returns `None` and logs a warning if the handle was not issued by this registry.
    #[must_use]
    pub fn behavior(&self, handle: BehaviorHandle<T>) -> Option<Arc<PoolBehavior<T>>> {
        let behaviors = self.behaviors.lock().expect(ERR_POISONED_LOCK);

        match behaviors.get(handle) {
            Ok(behavior) => Some(Arc::clone(behavior)),
            Err(error) => {
                warn!(?handle, %error, "behavior lookup failed");
                None
            }
        }
    }

    /// The pool a handle refers to.
    ///
    /// Returns `None` and logs a warning if the handle is unknown or its pool has been destroyed
    /// through the registry.
    #[must_use]
    pub fn fixed_pool(&self, handle: FixedPoolHandle<T>) -> Option<FixedPool<T>> {
        let pools = self.fixed_pools.lock().expect(ERR_POISONED_LOCK);

        match pools.get(handle) {
            Ok(pool) => Some(pool.clone()),
            Err(error) => {
                warn!(?handle, %error, "fixed pool lookup failed");
                None
            }
        }
    }

    /// Destroys the pool a handle refers to, running the destroy callback on every remaining
    /// element, and invalidates the handle.
    ///
    /// Returns `false` and logs a warning if the handle is unknown or already invalidated.
    pub fn destroy_fixed_pool(&self, handle: FixedPoolHandle<T>) -> bool {
        let removed = self.fixed_pools.lock().expect(ERR_POISONED_LOCK).remove(handle);

        match removed {
            // The pool may already have been destroyed through one of its own handles.
            Ok(pool) => {
                pool.destroy();
                true
            }
            Err(error) => {
                warn!(?handle, %error, "tried to destroy an unknown fixed pool");
                false
            }
        }
    }

    /// The pool a handle refers to.
    ///
    /// Returns `None` and logs a warning if the handle is unknown or its pool has been destroyed
    /// through the registry.
    #[must_use]
    pub fn growable_pool(&self, handle: GrowablePoolHandle<T>) -> Option<GrowablePool<T>> {
        let pools = self.growable_pools.lock().expect(ERR_POISONED_LOCK);

        match pools.get(handle) {
            Ok(pool) => Some(pool.clone()),
            Err(error) => {
                warn!(?handle, %error, "growable pool lookup failed");
                None
            }
        }
    }

    /// Destroys the pool a handle refers to, running the destroy callback on every remaining
    /// element, and invalidates the handle.
    ///
    /// Returns `false` and logs a warning if the handle is unknown or already invalidated.
    pub fn destroy_growable_pool(&self, handle: GrowablePoolHandle<T>) -> bool {
        let removed = self
            .growable_pools
            .lock()
            .expect(ERR_POISONED_LOCK)
            .remove(handle);

        match removed {
            Ok(pool) => {
                pool.destroy();
                true
            }
            Err(error) => {
                warn!(?handle, %error, "tried to destroy an unknown growable pool");
                false
            }
        }
    }

    /// The number of registered behaviors.
    #[must_use]
    pub fn behavior_count(&self) -> usize {
        self.behaviors.lock().expect(ERR_POISONED_LOCK).len()
    }

    /// The number of fixed-capacity pools tracked by the registry.
    #[must_use]
    pub fn fixed_pool_count(&self) -> usize {
        self.fixed_pools.lock().expect(ERR_POISONED_LOCK).len()
    }

    /// The number of growable pools tracked by the registry.
    #[must_use]
    pub fn growable_pool_count(&self) -> usize {
        self.growable_pools.lock().expect(ERR_POISONED_LOCK).len()
    }

    /// Snapshots of every live pool tracked by the registry, fixed-capacity pools first.
    #[must_use]
    pub fn pool_infos(&self) -> Vec<PoolInfo> {
        let fixed = self
            .fixed_pools
            .lock()
            .expect(ERR_POISONED_LOCK)
            .values()
            .cloned()
            .collect::<Vec<_>>();

        let growable = self
            .growable_pools
            .lock()
            .expect(ERR_POISONED_LOCK)
            .values()
            .cloned()
            .collect::<Vec<_>>();

        // The table locks are released before any pool lock is taken.
        fixed
            .iter()
            .filter_map(FixedPool::info)
            .chain(growable.iter().filter_map(GrowablePool::info))
            .collect()
    }

    fn enforce<R>(&self, operation: &'static str, name: &str, result: Result<R>) -> Result<R> {
        let result = self.exhaustion_policy.enforce(operation, result);

        if let Err(error) = &result {
            warn!(operation, name, %error, "pool registry operation failed");
        }

        result
    }
}

impl<T: Default> PoolRegistry<T> {
    /// Creates a fixed-capacity pool from a registered behavior.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHandle`][crate::Error::UnknownHandle] if the behavior handle was
    /// not issued by this registry. Returns
    /// [`Error::AllocationFailed`][crate::Error::AllocationFailed] or
    /// [`Error::OutOfHandles`][crate::Error::OutOfHandles] if the pool cannot be allocated or
    /// tracked, unless the exhaustion policy aborts the process instead.
    pub fn create_fixed_pool(
        &self,
        name: impl Into<String>,
        behavior: BehaviorHandle<T>,
    ) -> Result<FixedPoolHandle<T>> {
        let name = name.into();

        let behavior = {
            let behaviors = self.behaviors.lock().expect(ERR_POISONED_LOCK);
            let resolved = behaviors.get(behavior).map(Arc::clone);
            self.enforce("create_fixed_pool", &name, resolved)?
        };

        let raw = self.enforce(
            "create_fixed_pool",
            &name,
            RawFixedPool::new(name.clone(), behavior),
        )?;

        let pool = FixedPool::new(raw, self.exhaustion_policy);

        let result = self
            .fixed_pools
            .lock()
            .expect(ERR_POISONED_LOCK)
            .insert(pool);

        self.enforce("create_fixed_pool", &name, result)
    }

    /// Creates a growable pool from a builder and starts tracking it.
    ///
    /// The exhaustion policy of the builder is replaced with that of the registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`][crate::Error::AllocationFailed] or
    /// [`Error::OutOfHandles`][crate::Error::OutOfHandles] if the pool cannot be allocated or
    /// tracked, unless the exhaustion policy aborts the process instead.
    pub fn create_growable_pool(
        &self,
        builder: GrowablePoolBuilder<T>,
    ) -> Result<GrowablePoolHandle<T>> {
        let name = builder.name.clone();

        let pool = self.enforce(
            "create_growable_pool",
            &name,
            builder.exhaustion_policy(self.exhaustion_policy).build(),
        )?;

        let result = self
            .growable_pools
            .lock()
            .expect(ERR_POISONED_LOCK)
            .insert(pool);

        self.enforce("create_growable_pool", &name, result)
    }
}

impl<T> Default for PoolRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PoolRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("exhaustion_policy", &self.exhaustion_policy)
            .field("created_at", &self.created_at)
            .field("behaviors", &self.behavior_count())
            .field("fixed_pools", &self.fixed_pool_count())
            .field("growable_pools", &self.growable_pool_count())
            .finish()
    }
}

/// Builder for creating a [`PoolRegistry`].
///
/// # Examples
///
/// ```
/// use slot_pool::{ExhaustionPolicy, PoolRegistry};
///
/// let registry = PoolRegistry::<u32>::builder()
///     .max_behaviors(8)
///     .max_pools(100)
///     .exhaustion_policy(ExhaustionPolicy::ReturnError)
///     .build();
///
/// assert_eq!(registry.behavior_count(), 0);
/// ```
#[must_use]
pub struct PoolRegistryBuilder<T> {
    max_behaviors: NonZero<usize>,
    max_pools: NonZero<usize>,
    exhaustion_policy: ExhaustionPolicy,

    _element: PhantomData<fn() -> T>,
}

impl<T> PoolRegistryBuilder<T> {
    fn new() -> Self {
        Self {
            max_behaviors: DEFAULT_MAX_BEHAVIORS,
            max_pools: DEFAULT_MAX_POOLS,
            exhaustion_policy: ExhaustionPolicy::default(),
            _element: PhantomData,
        }
    }

    /// Sets the maximum number of behaviors the registry accepts.
    ///
    /// # Panics
    ///
    /// Panics if the limit is zero.
    pub fn max_behaviors(mut self, limit: usize) -> Self {
        self.max_behaviors = NonZero::new(limit).expect("behavior limit must be non-zero");
        self
    }

    /// Sets the maximum number of live pools the registry tracks. The limit applies separately
    /// to fixed-capacity pools and to growable pools.
    ///
    /// # Panics
    ///
    /// Panics if the limit is zero.
    pub fn max_pools(mut self, limit: usize) -> Self {
        self.max_pools = NonZero::new(limit).expect("pool limit must be non-zero");
        self
    }

    /// Sets what happens when the registry or one of its pools runs out of a resource.
    pub fn exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion_policy = policy;
        self
    }

    /// Builds the registry.
    #[must_use]
    pub fn build(self) -> PoolRegistry<T> {
        PoolRegistry {
            exhaustion_policy: self.exhaustion_policy,
            created_at: Instant::now(),
            behaviors: Mutex::new(HandleTable::new("behavior", self.max_behaviors)),
            fixed_pools: Mutex::new(HandleTable::new("fixed pool", self.max_pools)),
            growable_pools: Mutex::new(HandleTable::new("growable pool", self.max_pools)),
        }
    }
}

impl<T> fmt::Debug for PoolRegistryBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("max_behaviors", &self.max_behaviors)
            .field("max_pools", &self.max_pools)
            .field("exhaustion_policy", &self.exhaustion_policy)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::Error;

    assert_impl_all!(PoolRegistry<u64>: Send, Sync, fmt::Debug, Default);
    assert_impl_all!(PoolRegistryBuilder<u64>: Send, fmt::Debug);

    fn behavior(capacity: usize) -> PoolBehavior<u64> {
        PoolBehavior::builder("test").capacity(capacity).build()
    }

    #[test]
    fn behavior_table_is_bounded() {
        let registry = PoolRegistry::<u64>::builder().max_behaviors(2).build();

        registry.create_behavior(behavior(1)).unwrap();
        registry.create_behavior(behavior(1)).unwrap();

        let error = registry.create_behavior(behavior(1)).unwrap_err();
        assert!(matches!(
            error,
            Error::OutOfHandles {
                table: "behavior",
                limit: 2
            }
        ));
        assert_eq!(registry.behavior_count(), 2);
    }

    #[test]
    fn pools_from_one_behavior_are_independent() {
        let registry = PoolRegistry::new();
        let behavior = registry.create_behavior(behavior(2)).unwrap();

        let first = registry.create_fixed_pool("first", behavior).unwrap();
        let second = registry.create_fixed_pool("second", behavior).unwrap();

        let first = registry.fixed_pool(first).unwrap();
        let second = registry.fixed_pool(second).unwrap();

        first.add().unwrap();
        first.add().unwrap();
        assert!(first.add().is_err());

        assert!(second.is_empty());
        second.add().unwrap();
        assert_eq!(registry.fixed_pool_count(), 2);
    }

    #[test]
    fn destroyed_pool_handle_is_stale_after_slot_reuse() {
        let registry = PoolRegistry::builder().max_pools(1).build();
        let behavior = registry.create_behavior(behavior(4)).unwrap();

        let old = registry.create_fixed_pool("old", behavior).unwrap();
        let old_pool = registry.fixed_pool(old).unwrap();

        assert!(registry.destroy_fixed_pool(old));
        assert!(!old_pool.exists());
        assert!(!registry.destroy_fixed_pool(old));

        let new = registry.create_fixed_pool("new", behavior).unwrap();

        assert!(registry.fixed_pool(old).is_none());
        assert_eq!(registry.fixed_pool(new).unwrap().name(), "new");
    }

    #[test]
    fn pool_table_is_bounded() {
        let registry = PoolRegistry::builder().max_pools(1).build();
        let behavior = registry.create_behavior(behavior(4)).unwrap();

        registry.create_fixed_pool("only", behavior).unwrap();

        let error = registry.create_fixed_pool("extra", behavior).unwrap_err();
        assert!(matches!(error, Error::OutOfHandles { limit: 1, .. }));
    }

    #[test]
    fn growable_pools_are_tracked() {
        let registry = PoolRegistry::<u64>::new();

        let handle = registry
            .create_growable_pool(GrowablePool::builder("queue").node_capacity(2))
            .unwrap();

        let pool = registry.growable_pool(handle).unwrap();
        for _ in 0..3 {
            pool.add().unwrap();
        }
        assert_eq!(pool.node_count(), 2);

        assert!(registry.destroy_growable_pool(handle));
        assert!(!pool.exists());
        assert!(registry.growable_pool(handle).is_none());
        assert!(!registry.destroy_growable_pool(handle));
        assert_eq!(registry.growable_pool_count(), 0);
    }

    #[test]
    fn pool_infos_lists_live_pools() {
        let registry = PoolRegistry::<u64>::new();
        let behavior = registry.create_behavior(behavior(4)).unwrap();

        registry.create_fixed_pool("fixed", behavior).unwrap();
        registry
            .create_growable_pool(GrowablePool::builder("growable"))
            .unwrap();

        let names = registry
            .pool_infos()
            .into_iter()
            .map(|info| info.name)
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["fixed".to_string(), "growable".to_string()]);
    }

    #[test]
    fn registry_is_shareable_between_threads() {
        let registry = Arc::new(PoolRegistry::<u64>::new());
        let behavior = registry.create_behavior(behavior(8)).unwrap();

        let creators = (0..4)
            .map(|index| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry
                        .create_fixed_pool(format!("pool-{index}"), behavior)
                        .unwrap()
                })
            })
            .collect::<Vec<_>>();

        for creator in creators {
            let handle = creator.join().unwrap();
            assert!(registry.fixed_pool(handle).is_some());
        }

        assert_eq!(registry.fixed_pool_count(), 4);
    }

    #[test]
    fn uptime_advances() {
        let registry = PoolRegistry::<u8>::new();
        let first = registry.uptime();
        thread::sleep(Duration::from_millis(2));

        assert!(registry.uptime() > first);
    }
}
