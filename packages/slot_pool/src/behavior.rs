use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;
use std::sync::Arc;

/// Callback invoked with the slot index and the element stored there.
pub(crate) type SlotCallback<T> = Arc<dyn Fn(usize, &mut T) + Send + Sync>;

/// Shared description of a family of fixed-capacity pools.
///
/// A behavior records the element capacity and the element lifecycle callbacks once, after which
/// any number of [`FixedPool`][crate::FixedPool] instances can be created from it. Behaviors are
/// immutable and live as long as any pool or registry refers to them.
///
/// The element size is implied by the element type `T`.
///
/// # Examples
///
/// ```
/// use slot_pool::PoolBehavior;
///
/// let behavior = PoolBehavior::<u64>::builder("counters")
///     .capacity(16)
///     .on_init(|index, value| *value = index as u64)
///     .build();
///
/// assert_eq!(behavior.capacity(), 16);
/// assert_eq!(behavior.element_size(), 8);
/// ```
pub struct PoolBehavior<T> {
    name: String,
    capacity: NonZero<usize>,
    on_init: Option<SlotCallback<T>>,
    on_destroy: Option<SlotCallback<T>>,
}

impl<T> PoolBehavior<T> {
    /// Creates a builder for a behavior with the given name.
    #[inline]
    pub fn builder(name: impl Into<String>) -> PoolBehaviorBuilder<T> {
        PoolBehaviorBuilder::new(name.into())
    }

    /// The name the behavior was registered under.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of elements each pool of this behavior can hold.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// The size in bytes of one element.
    #[must_use]
    #[inline]
    pub fn element_size(&self) -> usize {
        size_of::<T>()
    }

    pub(crate) fn capacity_nz(&self) -> NonZero<usize> {
        self.capacity
    }

    pub(crate) fn init_element(&self, index: usize, element: &mut T) {
        if let Some(on_init) = &self.on_init {
            on_init(index, element);
        }
    }

    pub(crate) fn destroy_element(&self, index: usize, element: &mut T) {
        if let Some(on_destroy) = &self.on_destroy {
            on_destroy(index, element);
        }
    }
}

impl<T> fmt::Debug for PoolBehavior<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("on_init", &self.on_init.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .finish()
    }
}

/// Builder for creating a [`PoolBehavior`].
///
/// The capacity is mandatory, the callbacks are optional.
///
/// Both callbacks run while the owning pool is locked. They receive the slot index and the
/// element, and must not call back into the same pool.
#[must_use]
pub struct PoolBehaviorBuilder<T> {
    name: String,
    capacity: Option<NonZero<usize>>,
    on_init: Option<SlotCallback<T>>,
    on_destroy: Option<SlotCallback<T>>,

    _element: PhantomData<fn() -> T>,
}

impl<T> PoolBehaviorBuilder<T> {
    fn new(name: String) -> Self {
        Self {
            name,
            capacity: None,
            on_init: None,
            on_destroy: None,
            _element: PhantomData,
        }
    }

    /// Sets the number of elements each pool of this behavior can hold.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is zero.
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(NonZero::new(capacity).expect("pool capacity must be non-zero"));
        self
    }

    /// Sets the callback that initializes a freshly added element.
    ///
    /// The element has already been reset to its default value when the callback runs.
    #[inline]
    pub fn on_init(mut self, callback: impl Fn(usize, &mut T) + Send + Sync + 'static) -> Self {
        self.on_init = Some(Arc::new(callback));
        self
    }

    /// Sets the callback that runs before an element is removed, including the removals
    /// performed when the pool itself is destroyed.
    #[inline]
    pub fn on_destroy(mut self, callback: impl Fn(usize, &mut T) + Send + Sync + 'static) -> Self {
        self.on_destroy = Some(Arc::new(callback));
        self
    }

    /// Builds the behavior.
    ///
    /// # Panics
    ///
    /// Panics if no capacity has been set.
    #[must_use]
    pub fn build(self) -> PoolBehavior<T> {
        let capacity = self
            .capacity
            .expect("capacity must be set using .capacity() before calling .build()");

        PoolBehavior {
            name: self.name,
            capacity,
            on_init: self.on_init,
            on_destroy: self.on_destroy,
        }
    }
}

impl<T> fmt::Debug for PoolBehaviorBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("on_init", &self.on_init.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .finish()
    }
}
