/// Dispatch counters for monitoring distributor behaviour.
///
/// Mutated only by the dispatcher thread, so plain integers suffice; the
/// accessor hands out a copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    /// Packets handed directly into a worker slot.
    pub dispatched: u64,
    /// Packets queued on a backlog because of a flow-tag match.
    pub backlogged: u64,
    /// Input items un-popped and retried because a backlog was full.
    pub requeued: u64,
    /// Packets captured into the returns ring.
    pub returns_stored: u64,
    /// Worker shutdowns observed (RETURN flag).
    pub worker_shutdowns: u64,
    /// Completed flush calls.
    pub flushes: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}
