/// Depth of each worker's backlog FIFO. Part of the public contract: an
/// overloaded flow can queue at most this many packets behind the one in
/// flight before the dispatcher starts retrying input.
pub const BACKLOG_SIZE: usize = 8;

pub(crate) const BACKLOG_MASK: usize = BACKLOG_SIZE - 1;

/// Depth of the returns ring. The ring is lossy: once `MAX_RETURNS - 1`
/// packets are held, every further return overwrites the oldest entry.
pub const MAX_RETURNS: usize = 128;

pub(crate) const RETURNS_MASK: usize = MAX_RETURNS - 1;

/// Longest accepted instance name, in bytes.
pub const NAME_MAX: usize = 32;

/// Hard cap on workers per instance. The flow-affinity match is computed as
/// a 64-bit mask with one bit per worker, so this cannot be raised without
/// widening the mask.
pub const MAX_WORKERS: usize = 64;

/// Highest accepted NUMA node id plus one. The region binder builds its
/// nodemask in a single 64-bit word, so this cannot be raised without
/// widening the mask.
pub const MAX_NUMA_NODES: usize = 64;

// Masked-index arithmetic and the bitmasks rely on these.
const _: () = assert!(BACKLOG_SIZE.is_power_of_two());
const _: () = assert!(MAX_RETURNS.is_power_of_two());
const _: () = assert!(MAX_WORKERS <= u64::BITS as usize);
const _: () = assert!(MAX_NUMA_NODES <= u64::BITS as usize);

/// Configuration for a distributor instance.
///
/// Validation happens in [`Distributor::new`](crate::Distributor::new);
/// building a `Config` never fails.
#[derive(Debug, Clone)]
pub struct Config {
    /// Instance name, registered process-wide. Must be nonempty and at most
    /// [`NAME_MAX`] bytes.
    pub name: String,
    /// Number of worker slots, fixed for the lifetime of the instance.
    pub num_workers: usize,
    /// NUMA node to reserve slot memory on, below [`MAX_NUMA_NODES`].
    /// `None` leaves placement to the allocator. Only honoured when the
    /// `numa` feature is enabled, but validated either way.
    pub numa_node: Option<u32>,
}

impl Config {
    /// Creates a configuration with no NUMA placement.
    pub fn new(name: impl Into<String>, num_workers: usize) -> Self {
        Self {
            name: name.into(),
            num_workers,
            numa_node: None,
        }
    }

    /// Requests slot memory on the given NUMA node.
    pub fn on_numa_node(mut self, node: u32) -> Self {
        self.numa_node = Some(node);
        self
    }
}
