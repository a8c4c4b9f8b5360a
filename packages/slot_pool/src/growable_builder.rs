use std::any::type_name;
use std::fmt;
use std::num::NonZero;

use crate::constants::DEFAULT_NODE_CAPACITY;
use crate::raw_growable_pool::CoordinatesCallback;
use crate::{ExhaustionPolicy, GrowablePool, RawGrowablePool, Result, SlotCoordinates};

/// Builder for creating a [`GrowablePool`] or a [`RawGrowablePool`].
///
/// Every setting is optional. Nodes hold [`DEFAULT_NODE_CAPACITY`][crate::DEFAULT_NODE_CAPACITY]
/// elements unless configured otherwise.
///
/// # Examples
///
/// ```
/// use slot_pool::{ExhaustionPolicy, GrowablePool};
///
/// let pool = GrowablePool::<String>::builder("messages")
///     .node_capacity(64)
///     .on_init(|_, message| message.push_str("new"))
///     .exhaustion_policy(ExhaustionPolicy::ReturnError)
///     .build()
///     .unwrap();
///
/// let coordinates = pool.add().unwrap();
/// assert_eq!(pool.operate(coordinates, |message| message.clone()).unwrap(), "new");
/// ```
#[must_use]
pub struct GrowablePoolBuilder<T> {
    pub(crate) name: String,
    pub(crate) node_capacity: NonZero<usize>,
    pub(crate) on_init: Option<CoordinatesCallback<T>>,
    pub(crate) on_destroy: Option<CoordinatesCallback<T>>,
    pub(crate) exhaustion_policy: ExhaustionPolicy,
}

impl<T> GrowablePoolBuilder<T> {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            node_capacity: DEFAULT_NODE_CAPACITY,
            on_init: None,
            on_destroy: None,
            exhaustion_policy: ExhaustionPolicy::default(),
        }
    }

    /// Sets the number of elements each node holds.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is zero.
    pub fn node_capacity(mut self, capacity: usize) -> Self {
        self.node_capacity = NonZero::new(capacity).expect("node capacity must be non-zero");
        self
    }

    /// Sets the callback that initializes a freshly added element.
    ///
    /// The element has already been reset to its default value when the callback runs.
    pub fn on_init(
        mut self,
        callback: impl Fn(SlotCoordinates, &mut T) + Send + Sync + 'static,
    ) -> Self {
        self.on_init = Some(Box::new(callback));
        self
    }

    /// Sets the callback that runs before an element is removed, including removals by
    /// [`clear()`][GrowablePool::clear] and by destruction of the pool.
    pub fn on_destroy(
        mut self,
        callback: impl Fn(SlotCoordinates, &mut T) + Send + Sync + 'static,
    ) -> Self {
        self.on_destroy = Some(Box::new(callback));
        self
    }

    /// Sets what happens when the pool cannot grow. Only applies to [`build()`][Self::build].
    pub fn exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion_policy = policy;
        self
    }
}

impl<T: Default> GrowablePoolBuilder<T> {
    /// Builds a thread-safe pool with one empty node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`][crate::Error::AllocationFailed] if the first node
    /// cannot be allocated, unless the exhaustion policy aborts the process instead.
    pub fn build(self) -> Result<GrowablePool<T>> {
        let policy = self.exhaustion_policy;
        let result = RawGrowablePool::new(self);

        policy
            .enforce("create growable pool", result)
            .map(|pool| GrowablePool::new(pool, policy))
    }

    /// Builds a single-threaded pool with one empty node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`][crate::Error::AllocationFailed] if the first node
    /// cannot be allocated. The exhaustion policy is not applied.
    pub fn build_raw(self) -> Result<RawGrowablePool<T>> {
        RawGrowablePool::new(self)
    }
}

impl<T> fmt::Debug for GrowablePoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("node_capacity", &self.node_capacity)
            .field("on_init", &self.on_init.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .field("exhaustion_policy", &self.exhaustion_policy)
            .finish()
    }
}
