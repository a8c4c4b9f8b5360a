use std::num::NonZero;
use std::time::Duration;

use new_zealand::nz;

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - cannot continue execution because \
    a worker callback or task panicked while holding the cycle lock";

/// Time between the starts of two consecutive cycles unless configured otherwise.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_millis(16);

/// Node capacity of a worker's task queue unless configured otherwise.
pub const DEFAULT_TASK_QUEUE_NODE_CAPACITY: NonZero<usize> = nz!(0x100);
