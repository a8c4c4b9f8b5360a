use std::time::Instant;

/// Point-in-time description of a pool.
///
/// Obtained from [`FixedPool::info()`][crate::FixedPool::info] or
/// [`GrowablePool::info()`][crate::GrowablePool::info]. The snapshot does not change when the
/// pool does.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct PoolInfo {
    /// Name the pool was created with.
    pub name: String,

    /// Size in bytes of one element.
    pub element_size: usize,

    /// Total number of slots across all storage blocks.
    pub capacity: usize,

    /// Number of occupied slots.
    pub len: usize,

    /// Number of storage blocks. Always 1 for a fixed-capacity pool.
    pub node_count: usize,

    /// Approximate memory footprint of element storage and occupancy bitfields.
    pub size_bytes: usize,

    /// When the pool was created.
    pub created_at: Instant,
}

impl PoolInfo {
    /// Share of the capacity that is occupied, from 0 to 100.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "slot counts are far below the range where f64 loses integer precision"
    )]
    pub fn use_percentage(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }

        self.len as f64 * 100.0 / self.capacity as f64
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn info(len: usize, capacity: usize) -> PoolInfo {
        PoolInfo {
            name: "sample".to_string(),
            element_size: 8,
            capacity,
            len,
            node_count: 1,
            size_bytes: capacity * 8,
            created_at: Instant::now(),
        }
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "the values are exactly representable")]
    fn use_percentage_of_half_full_pool() {
        assert_eq!(info(2, 4).use_percentage(), 50.0);
        assert_eq!(info(0, 4).use_percentage(), 0.0);
        assert_eq!(info(4, 4).use_percentage(), 100.0);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "the value is exactly representable")]
    fn use_percentage_without_capacity_is_zero() {
        assert_eq!(info(0, 0).use_percentage(), 0.0);
    }
}
