use std::any::type_name;
use std::fmt;
use std::num::NonZero;
use std::ptr::NonNull;
use std::time::Instant;

use tracing::debug;

use crate::{
    Error, GrowablePoolBuilder, PoolInfo, Result, SlotAddress, SlotBlock, SlotCoordinates,
};

/// Callback invoked with the coordinates of an element and the element itself.
pub(crate) type CoordinatesCallback<T> = Box<dyn Fn(SlotCoordinates, &mut T) + Send + Sync>;

/// A pool of `T` that grows by appending fixed-size nodes as it fills up.
///
/// This is the single-threaded core behind [`GrowablePool`][crate::GrowablePool]. All
/// operations take `&mut self`, so the caller provides synchronization.
///
/// Elements are addressed by [`SlotCoordinates`]: the position of the node in the chain and
/// the slot index within that node. Nodes are never moved or released while the pool exists,
/// so coordinates and element pointers stay valid for as long as the element stays in the pool.
/// Clearing the pool vacates every slot but keeps the nodes for reuse.
///
/// # Allocation order
///
/// An added element is placed in the most recently appended node if that node has a vacant
/// slot. Otherwise the nodes are scanned from the head of the chain, and only if every node is
/// full is a new node appended.
///
/// # Examples
///
/// ```
/// use slot_pool::GrowablePool;
///
/// let mut pool = GrowablePool::<u32>::builder("events")
///     .node_capacity(2)
///     .build_raw()
///     .unwrap();
///
/// for value in 0..5 {
///     pool.add_with(|_, element| *element = value).unwrap();
/// }
///
/// assert_eq!(pool.len(), 5);
/// assert_eq!(pool.node_count(), 3);
///
/// pool.clear();
/// assert_eq!(pool.len(), 0);
/// assert_eq!(pool.node_count(), 3);
/// ```
pub struct RawGrowablePool<T> {
    name: String,
    node_capacity: NonZero<usize>,

    on_init: Option<CoordinatesCallback<T>>,
    on_destroy: Option<CoordinatesCallback<T>>,

    /// The chain of nodes. The head is the first entry and the tail is the last. Never empty.
    nodes: Vec<SlotBlock<T>>,

    /// Total number of occupied slots across all nodes.
    len: usize,

    created_at: Instant,
}

impl<T: Default> RawGrowablePool<T> {
    pub(crate) fn new(builder: GrowablePoolBuilder<T>) -> Result<Self> {
        let GrowablePoolBuilder {
            name,
            node_capacity,
            on_init,
            on_destroy,
            ..
        } = builder;

        let head = allocate_node(&name, node_capacity)?;

        Ok(Self {
            name,
            node_capacity,
            on_init,
            on_destroy,
            nodes: vec![head],
            len: 0,
            created_at: Instant::now(),
        })
    }

    /// Adds a default-valued element, runs the init callback on it and returns its coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if every node is full and a new node cannot be
    /// allocated.
    pub fn add(&mut self) -> Result<SlotCoordinates> {
        self.add_with(|_, _| {})
    }

    /// Adds a default-valued element, runs the init callback on it and then `f`, and returns
    /// its coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if every node is full and a new node cannot be
    /// allocated. Neither callback runs in that case.
    pub fn add_with(&mut self, f: impl FnOnce(SlotCoordinates, &mut T)) -> Result<SlotCoordinates> {
        let node_index = self.node_with_vacancy()?;

        let node = self
            .nodes
            .get_mut(node_index)
            .expect("node index was just selected from the chain");

        let (index_in_node, element) = node
            .acquire()
            .expect("node was just verified to have a vacant slot");

        // Cannot overflow, every counted element occupies a distinct slot in memory.
        self.len = self.len.wrapping_add(1);

        let coordinates = SlotCoordinates::new(node_index, index_in_node);

        if let Some(on_init) = &self.on_init {
            on_init(coordinates, element);
        }

        f(coordinates, element);

        Ok(coordinates)
    }

    /// Removes the element at `coordinates`, running the destroy callback on it first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if the coordinates lie outside the pool and
    /// [`Error::SlotVacant`] if the slot holds no element. The pool is unchanged in both cases.
    pub fn remove(&mut self, coordinates: SlotCoordinates) -> Result<()> {
        let node = node_mut(&self.name, &mut self.nodes, coordinates)?;

        let element = node
            .get_mut(coordinates.index_in_node())
            .ok_or_else(|| Error::SlotVacant {
                pool: self.name.clone(),
                slot: SlotAddress::Coordinates(coordinates),
            })?;

        if let Some(on_destroy) = &self.on_destroy {
            on_destroy(coordinates, element);
        }

        let released = node.release(coordinates.index_in_node());
        debug_assert!(released, "slot {coordinates} was verified as occupied");

        // Cannot underflow, the slot was occupied.
        self.len = self.len.wrapping_sub(1);

        Ok(())
    }

    /// Removes the element that `ptr` points to, running the destroy callback on it first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignElement`] if the pointer does not address a slot of any node
    /// and [`Error::SlotVacant`] if the addressed slot holds no element.
    pub fn remove_ptr(&mut self, ptr: NonNull<T>) -> Result<()> {
        let coordinates = self
            .coordinates_of(ptr)
            .ok_or_else(|| Error::ForeignElement {
                pool: self.name.clone(),
            })?;

        self.remove(coordinates)
    }

    /// Removes every element, running the destroy callback on each.
    ///
    /// The nodes are kept, so the capacity of the pool does not shrink.
    pub fn clear(&mut self) {
        let on_destroy = &self.on_destroy;

        for (node_index, node) in self.nodes.iter_mut().enumerate() {
            node.clear_with(|index_in_node, element| {
                if let Some(on_destroy) = on_destroy {
                    on_destroy(SlotCoordinates::new(node_index, index_in_node), element);
                }
            });
        }

        self.len = 0;
    }

    /// Returns the index of a node that has a vacant slot, appending one if necessary.
    fn node_with_vacancy(&mut self) -> Result<usize> {
        let tail = self.nodes.len().wrapping_sub(1);

        if self.nodes.last().is_some_and(|node| !node.is_full()) {
            return Ok(tail);
        }

        if let Some(node_index) = self.nodes.iter().position(|node| !node.is_full()) {
            return Ok(node_index);
        }

        let node = allocate_node(&self.name, self.node_capacity)?;
        self.nodes.push(node);

        debug!(
            pool = %self.name,
            node_count = self.nodes.len(),
            node_capacity = self.node_capacity.get(),
            "growable pool appended a node"
        );

        Ok(self.nodes.len().wrapping_sub(1))
    }
}

impl<T> RawGrowablePool<T> {
    /// The name the pool was created with.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of occupied slots across all nodes.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no slot is occupied.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of nodes in the chain. Never less than 1.
    #[must_use]
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The number of slots in each node.
    #[must_use]
    #[inline]
    pub fn node_capacity(&self) -> usize {
        self.node_capacity.get()
    }

    /// The total number of slots across all nodes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len().saturating_mul(self.node_capacity.get())
    }

    /// Whether the slot at `coordinates` holds an element.
    #[must_use]
    pub fn is_in_use(&self, coordinates: SlotCoordinates) -> bool {
        self.nodes
            .get(coordinates.node_index())
            .is_some_and(|node| node.is_used(coordinates.index_in_node()))
    }

    /// The element at `coordinates`, if the slot is occupied.
    #[must_use]
    pub fn get(&self, coordinates: SlotCoordinates) -> Option<&T> {
        self.nodes
            .get(coordinates.node_index())?
            .get(coordinates.index_in_node())
    }

    /// The element at `coordinates`, if the slot is occupied.
    #[must_use]
    pub fn get_mut(&mut self, coordinates: SlotCoordinates) -> Option<&mut T> {
        self.nodes
            .get_mut(coordinates.node_index())?
            .get_mut(coordinates.index_in_node())
    }

    /// Translates coordinates to a pointer to the slot without checking whether the slot is
    /// occupied. Returns `None` if the coordinates lie outside the pool.
    ///
    /// The pointer stays valid for as long as the pool exists.
    #[must_use]
    pub fn get_ptr(&mut self, coordinates: SlotCoordinates) -> Option<NonNull<T>> {
        self.nodes
            .get_mut(coordinates.node_index())?
            .ptr(coordinates.index_in_node())
    }

    /// Finds the coordinates of the slot `ptr` points to by testing which node's storage range
    /// contains the address. Nodes are tested in chain order.
    ///
    /// Returns `None` if no node contains the address. Whether the slot is occupied is not
    /// checked.
    #[must_use]
    pub fn coordinates_of(&self, ptr: NonNull<T>) -> Option<SlotCoordinates> {
        self.nodes
            .iter()
            .enumerate()
            .find_map(|(node_index, node)| {
                node.index_of(ptr.as_ptr())
                    .map(|index_in_node| SlotCoordinates::new(node_index, index_in_node))
            })
    }

    /// Runs `f` on the element at `coordinates` and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if the coordinates lie outside the pool and
    /// [`Error::SlotVacant`] if the slot holds no element. `f` does not run in either case.
    pub fn operate<R>(&mut self, coordinates: SlotCoordinates, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let node = node_mut(&self.name, &mut self.nodes, coordinates)?;

        let element = node
            .get_mut(coordinates.index_in_node())
            .ok_or_else(|| Error::SlotVacant {
                pool: self.name.clone(),
                slot: SlotAddress::Coordinates(coordinates),
            })?;

        Ok(f(element))
    }

    /// Runs `f` on every element, visiting nodes in chain order and slots in ascending order
    /// within each node.
    pub fn iterate(&mut self, mut f: impl FnMut(SlotCoordinates, &mut T)) {
        for (node_index, node) in self.nodes.iter_mut().enumerate() {
            node.for_each_used(|index_in_node, element| {
                f(SlotCoordinates::new(node_index, index_in_node), element);
            });
        }
    }

    /// A snapshot of the pool's metadata.
    #[must_use]
    pub fn info(&self) -> PoolInfo {
        PoolInfo {
            name: self.name.clone(),
            element_size: size_of::<T>(),
            capacity: self.capacity(),
            len: self.len,
            node_count: self.nodes.len(),
            size_bytes: SlotBlock::<T>::size_bytes(self.node_capacity)
                .saturating_mul(self.nodes.len()),
            created_at: self.created_at,
        }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        assert!(!self.nodes.is_empty(), "growable pool lost its head node");

        let mut total = 0_usize;

        for node in &self.nodes {
            node.integrity_check();
            assert_eq!(node.capacity(), self.node_capacity.get());
            total = total.wrapping_add(node.len());
        }

        assert_eq!(total, self.len, "pool-wide count disagrees with node counts");
    }
}

/// The node addressed by `coordinates`, or the error describing why it does not exist.
fn node_mut<'a, T>(
    pool: &str,
    nodes: &'a mut [SlotBlock<T>],
    coordinates: SlotCoordinates,
) -> Result<&'a mut SlotBlock<T>> {
    let node_count = nodes.len();

    let node = nodes
        .get_mut(coordinates.node_index())
        .ok_or_else(|| Error::IndexOutOfBounds {
            pool: pool.to_string(),
            index: coordinates.node_index(),
            capacity: node_count,
        })?;

    let node_capacity = node.capacity();

    if coordinates.index_in_node() >= node_capacity {
        return Err(Error::IndexOutOfBounds {
            pool: pool.to_string(),
            index: coordinates.index_in_node(),
            capacity: node_capacity,
        });
    }

    Ok(node)
}

fn allocate_node<T: Default>(pool: &str, capacity: NonZero<usize>) -> Result<SlotBlock<T>> {
    SlotBlock::new(capacity).map_err(|_| Error::AllocationFailed {
        pool: pool.to_string(),
        bytes: SlotBlock::<T>::size_bytes(capacity),
    })
}

impl<T> Drop for RawGrowablePool<T> {
    fn drop(&mut self) {
        let Some(on_destroy) = &self.on_destroy else {
            return;
        };

        for (node_index, node) in self.nodes.iter_mut().enumerate() {
            node.for_each_used(|index_in_node, element| {
                on_destroy(SlotCoordinates::new(node_index, index_in_node), element);
            });
        }
    }
}

impl<T> fmt::Debug for RawGrowablePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("node_capacity", &self.node_capacity)
            .field("node_count", &self.nodes.len())
            .field("len", &self.len)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
