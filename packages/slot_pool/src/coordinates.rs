use std::fmt;

/// Location of an element in a [`GrowablePool`][crate::GrowablePool].
///
/// Coordinates stay valid for as long as the element stays in the pool. After the element is
/// removed, the same coordinates may be handed out again for a different element.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SlotCoordinates {
    /// The position of the node in the pool's chain of nodes, counted from the head.
    node_index: usize,

    /// The slot index within the node.
    index_in_node: usize,
}

impl SlotCoordinates {
    /// Creates coordinates from their two parts.
    #[must_use]
    #[inline]
    pub const fn new(node_index: usize, index_in_node: usize) -> Self {
        Self {
            node_index,
            index_in_node,
        }
    }

    /// The position of the node in the pool's chain of nodes, counted from the head.
    #[must_use]
    #[inline]
    pub const fn node_index(&self) -> usize {
        self.node_index
    }

    /// The slot index within the node.
    #[must_use]
    #[inline]
    pub const fn index_in_node(&self) -> usize {
        self.index_in_node
    }
}

impl fmt::Display for SlotCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_index, self.index_in_node)
    }
}

/// The slot an operation addressed, in the form the pool kind uses.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SlotAddress {
    /// A flat index into a [`FixedPool`][crate::FixedPool].
    Index(usize),

    /// Coordinates in a [`GrowablePool`][crate::GrowablePool].
    Coordinates(SlotCoordinates),
}

impl From<usize> for SlotAddress {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<SlotCoordinates> for SlotAddress {
    fn from(coordinates: SlotCoordinates) -> Self {
        Self::Coordinates(coordinates)
    }
}

impl fmt::Display for SlotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Coordinates(coordinates) => write!(f, "{coordinates}"),
        }
    }
}
