use std::collections::TryReserveError;
use std::mem;
use std::num::NonZero;
use std::ptr::NonNull;

use crate::SlotBits;

/// A contiguous block of element slots paired with an occupancy bitfield.
///
/// This is the storage unit of both pool kinds: a fixed-capacity pool owns exactly one block and
/// a growable pool owns one block per node.
///
/// Every slot always holds a valid `T`. A vacant slot holds `T::default()`, and an element is
/// reset to `T::default()` again at the moment it is acquired.
///
/// # Out of band access
///
/// The element storage is allocated once and never moves, so pointers obtained from
/// [`ptr()`][Self::ptr] stay valid until the block is dropped.
#[derive(Debug)]
pub(crate) struct SlotBlock<T> {
    slots: Box<[T]>,
    bits: SlotBits,
}

impl<T: Default> SlotBlock<T> {
    /// Allocates a block of `capacity` vacant slots.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be reserved.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized, because zero-sized elements have no distinguishable address.
    pub(crate) fn new(capacity: NonZero<usize>) -> Result<Self, TryReserveError> {
        assert!(
            size_of::<T>() > 0,
            "pools cannot hold zero-sized elements because element addresses must be unique"
        );

        let bits = SlotBits::new(capacity)?;

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity.get())?;
        slots.resize_with(capacity.get(), T::default);

        Ok(Self {
            slots: slots.into_boxed_slice(),
            bits,
        })
    }

    /// Marks a vacant slot occupied and returns its index together with the freshly reset
    /// element. Returns `None` if the block is full.
    pub(crate) fn acquire(&mut self) -> Option<(usize, &mut T)> {
        let index = self.bits.acquire()?;

        let element = self
            .slots
            .get_mut(index)
            .expect("slot bitfield only hands out indexes within capacity");
        *element = T::default();

        Some((index, element))
    }

    /// Marks an occupied slot vacant and drops the element it held.
    ///
    /// Returns `false` if the slot was not occupied.
    pub(crate) fn release(&mut self, index: usize) -> bool {
        if !self.bits.release(index) {
            return false;
        }

        let element = self
            .slots
            .get_mut(index)
            .expect("released index was occupied and therefore within capacity");
        drop(mem::take(element));

        true
    }

    /// Visits every occupied slot in ascending index order, then vacates them all.
    pub(crate) fn clear_with(&mut self, mut f: impl FnMut(usize, &mut T)) {
        self.for_each_used(&mut f);

        for index in self.bits.iter_used() {
            if let Some(element) = self.slots.get_mut(index) {
                drop(mem::take(element));
            }
        }

        self.bits.clear();
    }
}

impl<T> SlotBlock<T> {
    /// Number of bytes of storage a block of the given capacity occupies.
    #[must_use]
    pub(crate) fn size_bytes(capacity: NonZero<usize>) -> usize {
        capacity
            .get()
            .saturating_mul(size_of::<T>())
            .saturating_add(SlotBits::size_bytes(capacity))
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.bits.capacity()
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.bits.len()
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.bits.len() == 0
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.bits.is_full()
    }

    #[must_use]
    pub(crate) fn is_used(&self, index: usize) -> bool {
        self.bits.is_used(index)
    }

    /// The element in an occupied slot.
    #[must_use]
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        if !self.bits.is_used(index) {
            return None;
        }

        self.slots.get(index)
    }

    /// The element in an occupied slot.
    #[must_use]
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if !self.bits.is_used(index) {
            return None;
        }

        self.slots.get_mut(index)
    }

    /// Pointer to a slot, whether occupied or not. Returns `None` if the index is beyond the
    /// capacity of the block.
    #[must_use]
    pub(crate) fn ptr(&mut self, index: usize) -> Option<NonNull<T>> {
        self.slots.get_mut(index).map(NonNull::from)
    }

    /// Resolves a pointer to the index of the slot it addresses.
    ///
    /// Returns `None` unless the pointer addresses the start of a slot within this block.
    #[must_use]
    pub(crate) fn index_of(&self, ptr: *const T) -> Option<usize> {
        let element_size = size_of::<T>();
        let start = self.slots.as_ptr().addr();
        let offset = ptr.addr().checked_sub(start)?;

        // Cannot be zero, enforced at construction.
        let index = offset.checked_div(element_size)?;

        if index >= self.capacity() || offset.checked_rem(element_size)? != 0 {
            return None;
        }

        Some(index)
    }

    /// Visits every occupied slot in ascending index order.
    pub(crate) fn for_each_used(&mut self, mut f: impl FnMut(usize, &mut T)) {
        for index in self.bits.iter_used() {
            let element = self
                .slots
                .get_mut(index)
                .expect("slot bitfield only tracks indexes within capacity");

            f(index, element);
        }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        assert_eq!(
            self.slots.len(),
            self.bits.capacity(),
            "element storage and bitfield disagree on capacity"
        );

        self.bits.integrity_check();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use new_zealand::nz;

    use super::*;

    #[test]
    fn acquire_resets_element() {
        let mut block = SlotBlock::<u64>::new(nz!(2)).unwrap();

        let (index, element) = block.acquire().unwrap();
        *element = 99;

        // Scribble over the vacant slot through its pointer, as a raw caller might.
        assert!(block.release(index));
        let ptr = block.ptr(index).unwrap();
        // SAFETY: The block is alive and nothing else references the slot.
        unsafe {
            ptr.write(1234);
        }

        let (_, element) = block.acquire().unwrap();
        assert_eq!(*element, 0);
    }

    #[test]
    fn get_only_sees_occupied_slots() {
        let mut block = SlotBlock::<u32>::new(nz!(4)).unwrap();

        let (index, element) = block.acquire().unwrap();
        *element = 7;

        assert_eq!(block.get(index), Some(&7));

        let other = (0..4).find(|candidate| *candidate != index).unwrap();
        assert_eq!(block.get(other), None);
        assert_eq!(block.get(4), None);
    }

    #[test]
    fn index_of_resolves_own_pointers_only() {
        let mut block = SlotBlock::<u64>::new(nz!(8)).unwrap();
        let mut other = SlotBlock::<u64>::new(nz!(8)).unwrap();

        for index in 0..8 {
            let ptr = block.ptr(index).unwrap();
            assert_eq!(block.index_of(ptr.as_ptr()), Some(index));
        }

        let foreign = other.ptr(0).unwrap();
        assert_eq!(block.index_of(foreign.as_ptr()), None);

        // A pointer into the middle of an element does not address a slot.
        let base = block.ptr(1).unwrap().as_ptr();
        let misaligned = base.cast::<u8>().wrapping_add(3).cast::<u64>();
        assert_eq!(block.index_of(misaligned), None);

        assert!(block.ptr(8).is_none());
    }

    #[test]
    fn release_drops_element() {
        #[derive(Default)]
        struct Tracked(Option<Rc<Cell<usize>>>);

        impl Drop for Tracked {
            fn drop(&mut self) {
                if let Some(counter) = &self.0 {
                    counter.set(counter.get() + 1);
                }
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut block = SlotBlock::<Tracked>::new(nz!(3)).unwrap();

        let (index, element) = block.acquire().unwrap();
        *element = Tracked(Some(Rc::clone(&drops)));

        assert!(block.release(index));
        assert_eq!(drops.get(), 1);

        assert!(!block.release(index));
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn clear_with_visits_then_vacates() {
        let mut block = SlotBlock::<usize>::new(nz!(5)).unwrap();

        for _ in 0..3 {
            let (index, element) = block.acquire().unwrap();
            *element = index + 100;
        }

        let mut visited = Vec::new();
        block.clear_with(|index, element| visited.push((index, *element)));

        assert_eq!(visited.len(), 3);
        assert!(visited.iter().all(|(index, value)| *value == index + 100));
        assert!(block.is_empty());
        block.integrity_check();
    }

    #[test]
    #[should_panic]
    fn zero_sized_elements_are_rejected() {
        drop(SlotBlock::<()>::new(nz!(1)));
    }

    #[test]
    fn size_bytes_includes_bitfield() {
        assert_eq!(SlotBlock::<u32>::size_bytes(nz!(64)), 64 * 4 + 8);
    }
}
