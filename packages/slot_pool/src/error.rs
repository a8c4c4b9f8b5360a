use thiserror::Error;

use crate::SlotAddress;

/// Errors reported by pool and registry operations.
///
/// Variants fall into two classes. Warnings describe misuse that leaves the pool untouched,
/// such as naming a slot that holds nothing or talking to a destroyed pool. Fatal conditions
/// ([`Full`][Error::Full], [`OutOfHandles`][Error::OutOfHandles] and
/// [`AllocationFailed`][Error::AllocationFailed]) describe resource exhaustion and are subject
/// to the [`ExhaustionPolicy`][crate::ExhaustionPolicy] of the pool or registry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Every slot of a fixed-capacity pool is occupied.
    #[error("pool '{pool}' has no vacant slot left out of {capacity}")]
    Full {
        /// Name of the pool that ran out of slots.
        pool: String,

        /// The fixed capacity of the pool.
        capacity: usize,
    },

    /// A bounded handle table has no room for another entry.
    #[error("the {table} table is exhausted at {limit} entries")]
    OutOfHandles {
        /// Which table ran out of room.
        table: &'static str,

        /// The configured upper bound of the table.
        limit: usize,
    },

    /// A handle does not refer to a live entry, either because it never did or because
    /// the entry has since been destroyed and its slot reused.
    #[error("handle does not refer to a live entry in the {table} table")]
    UnknownHandle {
        /// Which table the handle was resolved against.
        table: &'static str,
    },

    /// The pool has been destroyed and no longer accepts operations.
    #[error("pool '{pool}' has been destroyed")]
    Destroyed {
        /// Name of the destroyed pool.
        pool: String,
    },

    /// The slot index lies beyond the capacity of the pool or node.
    #[error("index {index} is out of bounds in pool '{pool}' of capacity {capacity}")]
    IndexOutOfBounds {
        /// Name of the pool.
        pool: String,

        /// The offending index.
        index: usize,

        /// Number of slots available at the addressed level.
        capacity: usize,
    },

    /// The slot is valid but does not currently hold an element.
    #[error("slot {slot} of pool '{pool}' is vacant")]
    SlotVacant {
        /// Name of the pool.
        pool: String,

        /// The vacant slot.
        slot: SlotAddress,
    },

    /// The element pointer does not lie within any storage block owned by the pool.
    #[error("pointer does not address an element of pool '{pool}'")]
    ForeignElement {
        /// Name of the pool.
        pool: String,
    },

    /// Backing storage for the pool could not be reserved.
    #[error("failed to reserve {bytes} bytes of storage for pool '{pool}'")]
    AllocationFailed {
        /// Name of the pool.
        pool: String,

        /// Size of the failed reservation.
        bytes: usize,
    },
}

impl Error {
    /// Whether the error describes resource exhaustion rather than caller misuse.
    #[must_use]
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::Full { .. } | Self::OutOfHandles { .. } | Self::AllocationFailed { .. }
        )
    }
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn exhaustion_classification() {
        let full = Error::Full {
            pool: "items".to_string(),
            capacity: 4,
        };
        assert!(full.is_exhaustion());

        let table = Error::OutOfHandles {
            table: "behavior",
            limit: 64,
        };
        assert!(table.is_exhaustion());

        let vacant = Error::SlotVacant {
            pool: "items".to_string(),
            slot: SlotAddress::Index(3),
        };
        assert!(!vacant.is_exhaustion());

        let destroyed = Error::Destroyed {
            pool: "items".to_string(),
        };
        assert!(!destroyed.is_exhaustion());
    }

    #[test]
    fn messages_name_the_pool() {
        let error = Error::Full {
            pool: "entities".to_string(),
            capacity: 16,
        };

        let message = error.to_string();
        assert!(message.contains("entities"));
        assert!(message.contains("16"));
    }
}
