use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Instant;

use crate::exhaustion_policy::full;
use crate::{Error, PoolBehavior, PoolInfo, Result, SlotAddress, SlotBlock};

/// A fixed-capacity pool of `T` with index-addressed slots.
///
/// This is the single-threaded core behind [`FixedPool`][crate::FixedPool]. All operations take
/// `&mut self`, so the caller provides synchronization. The capacity and the element lifecycle
/// callbacks come from the [`PoolBehavior`] the pool was created from.
///
/// Elements are reset to `T::default()` when added. The init callback of the behavior runs on
/// every added element and the destroy callback runs on every removed element, including the
/// elements still present when the pool is dropped.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use slot_pool::{PoolBehavior, RawFixedPool};
///
/// let behavior = Arc::new(PoolBehavior::<u32>::builder("ids").capacity(4).build());
/// let mut pool = RawFixedPool::new("ids-0", behavior).unwrap();
///
/// let index = pool.add_with(|_, value| *value = 42).unwrap();
/// assert_eq!(pool.operate(index, |value| *value).unwrap(), 42);
///
/// pool.remove_index(index).unwrap();
/// assert!(pool.is_empty());
/// ```
pub struct RawFixedPool<T> {
    name: String,
    behavior: Arc<PoolBehavior<T>>,
    block: SlotBlock<T>,
    created_at: Instant,
}

impl<T: Default> RawFixedPool<T> {
    /// Creates an empty pool using the capacity and callbacks of `behavior`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the element storage cannot be reserved.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn new(name: impl Into<String>, behavior: Arc<PoolBehavior<T>>) -> Result<Self> {
        let name = name.into();
        let capacity = behavior.capacity_nz();

        let block = SlotBlock::new(capacity).map_err(|_| Error::AllocationFailed {
            pool: name.clone(),
            bytes: SlotBlock::<T>::size_bytes(capacity),
        })?;

        Ok(Self {
            name,
            behavior,
            block,
            created_at: Instant::now(),
        })
    }

    /// Adds a default-valued element, runs the init callback on it and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Full`] if every slot is occupied.
    pub fn add(&mut self) -> Result<usize> {
        self.add_with(|_, _| {})
    }

    /// Adds a default-valued element, runs the init callback on it and then `f`, and returns
    /// its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Full`] if every slot is occupied. Neither callback runs in that case.
    pub fn add_with(&mut self, f: impl FnOnce(usize, &mut T)) -> Result<usize> {
        let Some((index, element)) = self.block.acquire() else {
            return Err(full(&self.name, self.block.capacity()));
        };

        self.behavior.init_element(index, element);
        f(index, element);

        #[cfg(debug_assertions)]
        self.block.integrity_check();

        Ok(index)
    }

    /// Removes the element at `index`, running the destroy callback on it first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if the index is beyond the capacity and
    /// [`Error::SlotVacant`] if the slot holds no element. The pool is unchanged in both cases.
    pub fn remove_index(&mut self, index: usize) -> Result<()> {
        let element = occupied_mut(&self.name, &mut self.block, index)?;
        self.behavior.destroy_element(index, element);

        let released = self.block.release(index);
        debug_assert!(released, "slot {index} was verified as occupied");

        Ok(())
    }

    /// Removes the element that `ptr` points to, running the destroy callback on it first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignElement`] if the pointer does not address a slot of this pool
    /// and [`Error::SlotVacant`] if the addressed slot holds no element.
    pub fn remove_ptr(&mut self, ptr: NonNull<T>) -> Result<()> {
        let index = self.index_of(ptr).ok_or_else(|| Error::ForeignElement {
            pool: self.name.clone(),
        })?;

        self.remove_index(index)
    }
}

impl<T> RawFixedPool<T> {
    /// The name the pool was created with.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The behavior the pool was created from.
    #[must_use]
    #[inline]
    pub fn behavior(&self) -> &Arc<PoolBehavior<T>> {
        &self.behavior
    }

    /// The number of slots in the pool.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.block.capacity()
    }

    /// The number of occupied slots.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.block.len()
    }

    /// Whether no slot is occupied.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// Whether every slot is occupied.
    #[must_use]
    #[inline]
    pub fn is_full(&self) -> bool {
        self.block.is_full()
    }

    /// Whether the slot at `index` holds an element. Out of range indexes are never in use.
    #[must_use]
    #[inline]
    pub fn is_index_in_use(&self, index: usize) -> bool {
        self.block.is_used(index)
    }

    /// The element at `index`, if the slot is occupied.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.block.get(index)
    }

    /// The element at `index`, if the slot is occupied.
    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.block.get_mut(index)
    }

    /// Translates an index to a pointer to its slot without checking whether the slot is
    /// occupied. Returns `None` only if the index is beyond the capacity.
    ///
    /// The pointer stays valid for as long as the pool exists. Accessing the element through
    /// it is only sound while nothing else accesses the same slot, and the value read from a
    /// vacant slot is meaningless.
    #[must_use]
    pub fn get_ptr(&mut self, index: usize) -> Option<NonNull<T>> {
        self.block.ptr(index)
    }

    /// Translates an element pointer back to its slot index.
    ///
    /// Returns `None` if the pointer does not address the start of a slot of this pool.
    /// Whether the slot is occupied is not checked.
    #[must_use]
    pub fn index_of(&self, ptr: NonNull<T>) -> Option<usize> {
        self.block.index_of(ptr.as_ptr())
    }

    /// Runs `f` on the element at `index` and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if the index is beyond the capacity and
    /// [`Error::SlotVacant`] if the slot holds no element. `f` does not run in either case.
    pub fn operate<R>(&mut self, index: usize, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        occupied_mut(&self.name, &mut self.block, index).map(f)
    }

    /// Runs `f` on every element in ascending index order. Vacant slots are skipped.
    pub fn iterate(&mut self, f: impl FnMut(usize, &mut T)) {
        self.block.for_each_used(f);
    }

    /// A snapshot of the pool's metadata.
    #[must_use]
    pub fn info(&self) -> PoolInfo {
        PoolInfo {
            name: self.name.clone(),
            element_size: size_of::<T>(),
            capacity: self.block.capacity(),
            len: self.block.len(),
            node_count: 1,
            size_bytes: SlotBlock::<T>::size_bytes(self.behavior.capacity_nz()),
            created_at: self.created_at,
        }
    }
}

/// The element in an occupied slot, or the error describing why there is none.
fn occupied_mut<'a, T>(pool: &str, block: &'a mut SlotBlock<T>, index: usize) -> Result<&'a mut T> {
    let capacity = block.capacity();

    if index >= capacity {
        return Err(Error::IndexOutOfBounds {
            pool: pool.to_string(),
            index,
            capacity,
        });
    }

    block.get_mut(index).ok_or_else(|| Error::SlotVacant {
        pool: pool.to_string(),
        slot: SlotAddress::Index(index),
    })
}

impl<T> Drop for RawFixedPool<T> {
    fn drop(&mut self) {
        let behavior = &self.behavior;
        self.block
            .for_each_used(|index, element| behavior.destroy_element(index, element));
    }
}

impl<T> fmt::Debug for RawFixedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("behavior", &self.behavior.name())
            .field("capacity", &self.block.capacity())
            .field("len", &self.block.len())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(RawFixedPool<u64>: Send, Sync, fmt::Debug);

    fn behavior<T>(capacity: usize) -> Arc<PoolBehavior<T>> {
        Arc::new(PoolBehavior::builder("test").capacity(capacity).build())
    }

    #[test]
    fn add_until_full() {
        let mut pool = RawFixedPool::<u64>::new("numbers", behavior(4)).unwrap();

        let indexes = (0..4)
            .map(|_| pool.add().unwrap())
            .collect::<BTreeSet<_>>();

        assert_eq!(indexes, BTreeSet::from([0, 1, 2, 3]));
        assert!(pool.is_full());

        let error = pool.add().unwrap_err();
        assert!(matches!(error, Error::Full { capacity: 4, .. }));
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn init_callback_runs_before_add_with_closure() {
        let behavior = Arc::new(
            PoolBehavior::<Vec<&'static str>>::builder("ordered")
                .capacity(2)
                .on_init(|_, value| value.push("init"))
                .build(),
        );
        let mut pool = RawFixedPool::new("ordered", behavior).unwrap();

        let index = pool.add_with(|_, value| value.push("apply")).unwrap();

        assert_eq!(pool.get(index).unwrap(), &vec!["init", "apply"]);
    }

    #[test]
    fn added_element_starts_from_default() {
        let mut pool = RawFixedPool::<u64>::new("reused", behavior(1)).unwrap();

        let index = pool.add_with(|_, value| *value = 77).unwrap();
        pool.remove_index(index).unwrap();

        let index = pool.add().unwrap();
        assert_eq!(pool.get(index), Some(&0));
    }

    #[test]
    fn remove_vacant_and_out_of_range_are_errors() {
        let mut pool = RawFixedPool::<u64>::new("strict", behavior(3)).unwrap();

        assert!(matches!(
            pool.remove_index(1),
            Err(Error::SlotVacant {
                slot: SlotAddress::Index(1),
                ..
            })
        ));
        assert!(matches!(
            pool.remove_index(3),
            Err(Error::IndexOutOfBounds {
                index: 3,
                capacity: 3,
                ..
            })
        ));

        let index = pool.add().unwrap();
        pool.remove_index(index).unwrap();
        assert!(matches!(
            pool.remove_index(index),
            Err(Error::SlotVacant { .. })
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn destroy_callback_sees_removed_element() {
        let removed = Arc::new(Mutex::new(Vec::new()));

        let behavior = Arc::new(
            PoolBehavior::<u64>::builder("tracked")
                .capacity(4)
                .on_destroy({
                    let removed = Arc::clone(&removed);
                    move |index, value| removed.lock().unwrap().push((index, *value))
                })
                .build(),
        );
        let mut pool = RawFixedPool::new("tracked", behavior).unwrap();

        let index = pool.add_with(|_, value| *value = 5).unwrap();
        pool.remove_index(index).unwrap();

        assert_eq!(*removed.lock().unwrap(), vec![(index, 5)]);
    }

    #[test]
    fn drop_destroys_remaining_elements_only() {
        let removed = Arc::new(Mutex::new(Vec::new()));

        let behavior = Arc::new(
            PoolBehavior::<usize>::builder("dropped")
                .capacity(4)
                .on_init(|index, value| *value = index)
                .on_destroy({
                    let removed = Arc::clone(&removed);
                    move |index, _| removed.lock().unwrap().push(index)
                })
                .build(),
        );
        let mut pool = RawFixedPool::new("dropped", behavior).unwrap();

        let a = pool.add().unwrap();
        let b = pool.add().unwrap();
        let c = pool.add().unwrap();
        pool.remove_index(b).unwrap();

        removed.lock().unwrap().clear();
        drop(pool);

        let mut expected = vec![a, c];
        expected.sort_unstable();
        assert_eq!(*removed.lock().unwrap(), expected);
    }

    #[test]
    fn iterate_visits_live_elements_in_order() {
        let mut pool = RawFixedPool::<usize>::new("walk", behavior(8)).unwrap();

        let indexes = (0..6)
            .map(|_| pool.add_with(|index, value| *value = index * 2).unwrap())
            .collect::<Vec<_>>();
        pool.remove_index(indexes[1]).unwrap();
        pool.remove_index(indexes[4]).unwrap();

        let mut visited = Vec::new();
        pool.iterate(|index, value| {
            assert_eq!(*value, index * 2);
            visited.push(index);
        });

        let mut expected = indexes.clone();
        expected.retain(|index| *index != indexes[1] && *index != indexes[4]);
        expected.sort_unstable();

        assert_eq!(visited, expected);
    }

    #[test]
    fn operate_mutates_in_place() {
        let mut pool = RawFixedPool::<u32>::new("counters", behavior(2)).unwrap();
        let index = pool.add().unwrap();

        for _ in 0..3 {
            pool.operate(index, |value| *value += 1).unwrap();
        }

        assert_eq!(pool.get(index), Some(&3));
        assert!(pool.operate(5, |_| ()).is_err());
    }

    #[test]
    fn pointers_round_trip_to_indexes() {
        let mut pool = RawFixedPool::<u64>::new("addresses", behavior(16)).unwrap();
        let index = pool.add_with(|_, value| *value = 9).unwrap();

        let ptr = pool.get_ptr(index).unwrap();
        assert_eq!(pool.index_of(ptr), Some(index));

        // SAFETY: The pool is alive and no reference to the slot exists.
        assert_eq!(unsafe { *ptr.as_ptr() }, 9);

        pool.remove_ptr(ptr).unwrap();
        assert!(!pool.is_index_in_use(index));
        assert!(pool.get_ptr(16).is_none());
    }

    #[test]
    fn remove_ptr_rejects_foreign_pointer() {
        let mut pool = RawFixedPool::<u64>::new("mine", behavior(2)).unwrap();
        pool.add().unwrap();

        let mut outside = 0_u64;
        let error = pool.remove_ptr(NonNull::from(&mut outside)).unwrap_err();

        assert!(matches!(error, Error::ForeignElement { .. }));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn info_reflects_state() {
        let mut pool = RawFixedPool::<u32>::new("stats", behavior(4)).unwrap();
        pool.add().unwrap();
        pool.add().unwrap();

        let info = pool.info();

        assert_eq!(info.name, "stats");
        assert_eq!(info.element_size, 4);
        assert_eq!(info.capacity, 4);
        assert_eq!(info.len, 2);
        assert_eq!(info.node_count, 1);
        assert!(info.size_bytes >= 16);
    }
}
