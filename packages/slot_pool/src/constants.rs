use std::num::NonZero;

use new_zealand::nz;

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - cannot continue execution because \
    a panic occurred while a pool was being modified and its slot bookkeeping may be corrupt";

/// Node capacity used by growable pools unless configured otherwise.
pub const DEFAULT_NODE_CAPACITY: NonZero<usize> = nz!(0x100);

/// Upper bound on the number of behaviors a registry accepts unless configured otherwise.
pub const DEFAULT_MAX_BEHAVIORS: NonZero<usize> = nz!(0x40);

/// Upper bound on the number of live pools a registry tracks unless configured otherwise.
pub const DEFAULT_MAX_POOLS: NonZero<usize> = nz!(0x200);
