use crate::config::{MAX_NUMA_NODES, MAX_WORKERS, NAME_MAX};
use thiserror::Error;

/// Errors surfaced by [`Distributor::new`](crate::Distributor::new).
///
/// Construction is the only fallible operation: the dispatch hot path, the
/// drain operations, and the whole worker API are infallible by design.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistributorError {
    /// Instance name is empty or longer than [`NAME_MAX`] bytes.
    #[error("instance name is empty or exceeds {max} bytes", max = NAME_MAX)]
    BadName,

    /// Worker count is zero or above [`MAX_WORKERS`].
    #[error("worker count {requested} out of range (1..={max})", max = MAX_WORKERS)]
    TooManyWorkers {
        /// The rejected worker count.
        requested: usize,
    },

    /// Requested NUMA node does not fit the region binder's nodemask.
    #[error("NUMA node {requested} out of range (0..{max})", max = MAX_NUMA_NODES)]
    BadNumaNode {
        /// The rejected node id.
        requested: u32,
    },

    /// The process-wide instance registry is unavailable (its lock was
    /// poisoned by a panicking thread).
    #[error("instance registry unavailable")]
    NoRegistry,

    /// An instance with this name is already registered.
    #[error("a distributor named {name:?} already exists")]
    AlreadyExists {
        /// The colliding name.
        name: String,
    },

    /// Reserving the slot memory region failed.
    #[error("failed to reserve {size} bytes of slot memory")]
    OutOfMemory {
        /// Requested region size in bytes.
        size: usize,
    },
}
