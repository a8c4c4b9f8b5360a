use std::any::type_name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{Error, Result};

/// Opaque reference to an entry of a [`PoolRegistry`][crate::PoolRegistry].
///
/// A handle carries the generation of the entry it was issued for. Once the entry is removed,
/// the handle stops resolving, even if the slot is later reused for a new entry. Handles are
/// plain values: copying or dropping one has no effect on the entry.
pub struct Handle<V> {
    index: usize,
    generation: u32,

    _entry: PhantomData<fn() -> V>,
}

impl<V> Handle<V> {
    fn new(index: usize, generation: u32) -> Self {
        Self {
            index,
            generation,
            _entry: PhantomData,
        }
    }
}

impl<V> Clone for Handle<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Handle<V> {}

impl<V> PartialEq for Handle<V> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<V> Eq for Handle<V> {}

impl<V> Hash for Handle<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<V> fmt::Debug for Handle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug)]
struct Entry<V> {
    generation: u32,
    value: Option<V>,
}

/// Bounded table of values addressed by generation-checked handles.
#[derive(Debug)]
pub(crate) struct HandleTable<V> {
    /// Used in error messages and diagnostics.
    table: &'static str,
    limit: NonZero<usize>,

    entries: Vec<Entry<V>>,

    /// Indexes of entries whose value has been removed.
    vacant: Vec<usize>,

    len: usize,
}

impl<V> HandleTable<V> {
    pub(crate) fn new(table: &'static str, limit: NonZero<usize>) -> Self {
        Self {
            table,
            limit,
            entries: Vec::new(),
            vacant: Vec::new(),
            len: 0,
        }
    }

    /// Stores a value and returns the handle that resolves to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfHandles`] if the table already holds `limit` values.
    pub(crate) fn insert(&mut self, value: V) -> Result<Handle<V>> {
        if let Some(index) = self.vacant.pop() {
            let entry = self
                .entries
                .get_mut(index)
                .expect("vacant list only holds indexes of existing entries");
            debug_assert!(entry.value.is_none());

            entry.value = Some(value);
            self.len = self.len.wrapping_add(1);

            return Ok(Handle::new(index, entry.generation));
        }

        if self.entries.len() >= self.limit.get() {
            return Err(Error::OutOfHandles {
                table: self.table,
                limit: self.limit.get(),
            });
        }

        let index = self.entries.len();
        self.entries.push(Entry {
            generation: 0,
            value: Some(value),
        });
        self.len = self.len.wrapping_add(1);

        Ok(Handle::new(index, 0))
    }

    /// The value a handle resolves to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHandle`] if the handle was not issued by this table or its entry
    /// has been removed.
    pub(crate) fn get(&self, handle: Handle<V>) -> Result<&V> {
        self.entries
            .get(handle.index)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.value.as_ref())
            .ok_or(Error::UnknownHandle { table: self.table })
    }

    /// Removes the value a handle resolves to. The handle and every copy of it stop resolving.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHandle`] under the same conditions as [`get()`][Self::get].
    pub(crate) fn remove(&mut self, handle: Handle<V>) -> Result<V> {
        let entry = self
            .entries
            .get_mut(handle.index)
            .filter(|entry| entry.generation == handle.generation)
            .ok_or(Error::UnknownHandle { table: self.table })?;

        let value = entry
            .value
            .take()
            .ok_or(Error::UnknownHandle { table: self.table })?;

        entry.generation = entry.generation.wrapping_add(1);
        self.vacant.push(handle.index);
        self.len = self.len.wrapping_sub(1);

        Ok(value)
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Every live value, in slot order.
    pub(crate) fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().filter_map(|entry| entry.value.as_ref())
    }
}
