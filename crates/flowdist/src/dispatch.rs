use crate::backlog::Backlog;
use crate::config::{Config, MAX_NUMA_NODES, MAX_WORKERS, NAME_MAX};
use crate::error::DistributorError;
use crate::invariants::debug_assert_tag_exclusive;
use crate::metrics::Metrics;
use crate::region::Region;
use crate::registry::{self, InstanceInfo, RegisterError};
use crate::returns::ReturnsRing;
use crate::slot::{self, ExchangeSlot, CACHE_LINE, FLAG_GET, FLAG_RETURN};
use crate::worker::Worker;
use crossbeam_utils::CachePadded;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::Arc;

// =============================================================================
// OWNERSHIP & THREADING MODEL
// =============================================================================
//
// The only cross-thread state is the slot array inside `Shared`. Everything
// on `Distributor` (backlogs, the in-flight tag table, the returns ring,
// metrics) belongs to the single dispatcher thread, which is why all
// dispatcher methods take `&mut self`: the "at most one thread drives the
// dispatcher side" contract is enforced by the borrow checker rather than by
// documentation.
//
// Packet ownership moves through the packed slot cells:
//
//   caller --Box--> process --raw--> slot --raw--> Worker::poll --Box-->
//   worker --Box--> Worker::get/request --raw--> slot --raw--> dispatcher
//   --raw--> returns ring --Box--> returned_pkts --> caller
//
// Each raw pointer is materialized back into a `Box` exactly once. Teardown
// reclaims whatever the dispatcher side still owns (backlogs, returns ring);
// a delivery sitting unconsumed in a slot belongs to neither side with
// certainty and is leaked.
//
// =============================================================================

/// Gives a work item its 32-bit flow identifier (for packets, typically the
/// NIC's RSS hash).
///
/// Items whose hashes collide are serviced by at most one worker at a time,
/// in submission order. The distributor derives its stored tag as
/// `flow_hash() | 1`, so the low hash bit carries no affinity information.
pub trait FlowHash {
    /// Returns the flow identifier of this item.
    fn flow_hash(&self) -> u32;
}

/// Slot block shared between the dispatcher handle and every worker handle.
pub(crate) struct Shared<P> {
    name: String,
    num_workers: usize,
    slots: NonNull<ExchangeSlot>,
    _region: Region,
    _marker: PhantomData<*mut P>,
}

// SAFETY: Shared hands out only `&ExchangeSlot` (atomic cells) and never a
// `P`; packets cross threads as raw pointers inside the cells, which is
// sound as long as the packet type itself may move between threads.
unsafe impl<P: Send> Send for Shared<P> {}
unsafe impl<P: Send> Sync for Shared<P> {}

impl<P> Shared<P> {
    #[inline]
    pub(crate) fn slot(&self, worker: usize) -> &ExchangeSlot {
        debug_assert!(worker < self.num_workers);
        // SAFETY: the region holds `num_workers` initialized slots and the
        // index is in range.
        unsafe { &*self.slots.as_ptr().add(worker) }
    }

}

impl<P> Drop for Shared<P> {
    fn drop(&mut self) {
        registry::global().unregister(&self.name);
        tracing::debug!(name = %self.name, "distributor instance unregistered");
    }
}

/// Single-producer, many-worker packet dispatcher with per-flow ordering.
///
/// One dispatcher thread feeds packets in with [`process`](Self::process)
/// and drains processed packets with [`returned_pkts`](Self::returned_pkts);
/// each [`Worker`] handle exchanges packets through its own lock-free slot.
/// Packets carrying the same [`FlowHash`] value are pinned to one worker at
/// a time, so a flow is never reordered by parallelism.
pub struct Distributor<P: FlowHash> {
    shared: Arc<Shared<P>>,
    backlogs: Box<[CachePadded<Backlog>]>,
    in_flight_tags: Box<[u32]>,
    returns: ReturnsRing<P>,
    metrics: Metrics,
}

// SAFETY: the returns ring and backlogs hold raw packet pointers owned by
// this handle; moving the handle to another thread moves that ownership
// with it, which is fine when the packet type itself is Send.
unsafe impl<P: FlowHash + Send> Send for Distributor<P> {}

impl<P: FlowHash> Distributor<P> {
    /// Creates an instance: validates the configuration, registers the name
    /// process-wide, reserves the slot region, and hands back the dispatcher
    /// handle plus one [`Worker`] handle per worker id.
    ///
    /// Construction is the only fallible operation in the crate.
    pub fn new(config: Config) -> Result<(Self, Vec<Worker<P>>), DistributorError> {
        if config.name.is_empty() || config.name.len() > NAME_MAX {
            return Err(DistributorError::BadName);
        }
        if config.num_workers == 0 || config.num_workers > MAX_WORKERS {
            return Err(DistributorError::TooManyWorkers {
                requested: config.num_workers,
            });
        }
        // Checked whether or not the `numa` feature is compiled in, so an
        // impossible node id fails identically across builds instead of
        // reaching the nodemask shift.
        if let Some(node) = config.numa_node {
            if node as usize >= MAX_NUMA_NODES {
                return Err(DistributorError::BadNumaNode { requested: node });
            }
        }

        let registry = registry::global();
        registry
            .register(InstanceInfo {
                name: config.name.clone(),
                num_workers: config.num_workers,
                numa_node: config.numa_node,
            })
            .map_err(|e| match e {
                RegisterError::Unavailable => DistributorError::NoRegistry,
                RegisterError::Duplicate => DistributorError::AlreadyExists {
                    name: config.name.clone(),
                },
            })?;

        let size = config.num_workers * mem::size_of::<ExchangeSlot>();
        let region = Region::reserve(&config.name, size, CACHE_LINE, config.numa_node)
            .map_err(|_| {
                registry.unregister(&config.name);
                DistributorError::OutOfMemory { size }
            })?;

        let slots = region.as_ptr().cast::<ExchangeSlot>();
        for i in 0..config.num_workers {
            // SAFETY: the region spans `num_workers` slots at slot alignment.
            unsafe { ptr::write(slots.add(i), ExchangeSlot::new()) };
        }

        let shared = Arc::new(Shared {
            name: config.name,
            num_workers: config.num_workers,
            // SAFETY: the region pointer is non-null by construction.
            slots: unsafe { NonNull::new_unchecked(slots) },
            _region: region,
            _marker: PhantomData,
        });

        let workers = (0..config.num_workers)
            .map(|id| Worker::new(Arc::clone(&shared), id))
            .collect();

        tracing::debug!(
            name = %shared.name,
            num_workers = shared.num_workers,
            "distributor created"
        );

        Ok((
            Self {
                backlogs: (0..shared.num_workers)
                    .map(|_| CachePadded::new(Backlog::new()))
                    .collect(),
                in_flight_tags: vec![0; shared.num_workers].into_boxed_slice(),
                returns: ReturnsRing::new(),
                metrics: Metrics::new(),
                shared,
            },
            workers,
        ))
    }

    /// Distributes a batch of packets across the workers.
    ///
    /// Packets whose derived tag matches a worker's in-flight tag are queued
    /// on that worker's backlog (FIFO, preserving flow order); everything
    /// else goes round-robin to the next worker asking for work. The call
    /// returns once every packet has been placed in a slot or a backlog, so
    /// it always reports the full batch size. That also means it spins
    /// while all workers are stalled with full backlogs.
    ///
    /// An empty batch runs the returns-only sweep instead and reports the
    /// number of workers whose slots were found idle in the GET state.
    pub fn process(&mut self, pkts: Vec<Box<P>>) -> usize {
        if pkts.is_empty() {
            return self.process_returns();
        }

        let shared = Arc::clone(&self.shared);
        let num_workers = shared.num_workers;
        let input: Vec<*mut P> = pkts.into_iter().map(Box::into_raw).collect();
        let total = input.len();

        let mut next_idx = 0;
        let mut next_value: i64 = 0; // staged packet, encoded; 0 = none
        let mut new_tag: u32 = 0; // tag of the staged packet
        let mut wkr = 0;

        while next_idx < total || next_value != 0 {
            let slot = shared.slot(wkr);
            let data = slot.load();
            let mut oldbuf: *mut P = ptr::null_mut();

            if next_value == 0 {
                // Stage the next input packet and derive its flow tag;
                // forcing the low bit keeps zero reserved for "idle".
                let pkt = input[next_idx];
                next_idx += 1;
                next_value = slot::encode(pkt, 0);
                // SAFETY: `pkt` came from Box::into_raw above and has not
                // been handed to any worker yet.
                new_tag = unsafe { (*pkt).flow_hash() } | 1;

                let mut match_mask: u64 = 0;
                for (i, &tag) in self.in_flight_tags.iter().enumerate() {
                    match_mask |= u64::from(tag == new_tag) << i;
                }
                if match_mask != 0 {
                    // The lowest matching worker owns this flow; queue
                    // behind its in-flight packet.
                    let owner = match_mask.trailing_zeros() as usize;
                    if self.backlogs[owner].push(next_value).is_ok() {
                        self.metrics.backlogged += 1;
                    } else {
                        // Backlog full: un-pop the input item and retry it
                        // on a later pass of the loop.
                        next_idx -= 1;
                        self.metrics.requeued += 1;
                    }
                    next_value = 0;
                }
            }

            if slot::flags(data) & FLAG_GET != 0
                && (!self.backlogs[wkr].is_empty() || next_value != 0)
            {
                if let Some(queued) = self.backlogs[wkr].pop() {
                    // Tag table untouched: the flow was pinned to this
                    // worker when the packet was queued.
                    slot.store(queued);
                } else {
                    slot.store(next_value);
                    debug_assert_tag_exclusive!(self.in_flight_tags, wkr, new_tag);
                    self.in_flight_tags[wkr] = new_tag;
                    next_value = 0;
                }
                self.metrics.dispatched += 1;
                oldbuf = slot::decode_ptr(data);
            } else if slot::flags(data) & FLAG_RETURN != 0 {
                self.handle_worker_shutdown(wkr);
                oldbuf = slot::decode_ptr(data);
            }

            self.store_return(oldbuf);

            wkr += 1;
            if wkr == num_workers {
                wkr = 0;
            }
        }

        // Final sweep: workers already asking for work take the next packet
        // off their backlog without waiting for another batch.
        for wkr in 0..num_workers {
            let slot = shared.slot(wkr);
            let data = slot.load();
            if !self.backlogs[wkr].is_empty() && slot::flags(data) & FLAG_GET != 0 {
                self.store_return(slot::decode_ptr(data));
                if let Some(queued) = self.backlogs[wkr].pop() {
                    slot.store(queued);
                    self.metrics.dispatched += 1;
                }
            }
        }

        total
    }

    /// Sweeps all slots without new input: collects returned packets,
    /// refills from backlogs, acknowledges shutdowns. Reports how many
    /// workers were observed idle (slot in GET state).
    fn process_returns(&mut self) -> usize {
        let shared = Arc::clone(&self.shared);
        let mut flushed = 0;

        for wkr in 0..shared.num_workers {
            let slot = shared.slot(wkr);
            let data = slot.load();
            let mut oldbuf: *mut P = ptr::null_mut();

            if slot::flags(data) & FLAG_GET != 0 {
                flushed += 1;
                if let Some(queued) = self.backlogs[wkr].pop() {
                    slot.store(queued);
                    self.metrics.dispatched += 1;
                } else {
                    // Re-arm the request with an empty return payload and
                    // mark the worker flow-idle.
                    slot.store(FLAG_GET);
                    self.in_flight_tags[wkr] = 0;
                }
                oldbuf = slot::decode_ptr(data);
            } else if slot::flags(data) & FLAG_RETURN != 0 {
                self.handle_worker_shutdown(wkr);
                oldbuf = slot::decode_ptr(data);
            }

            self.store_return(oldbuf);
        }

        flushed
    }

    /// Acknowledges a worker's RETURN: clears its flow state and slot, then
    /// re-dispatches anything still queued for it.
    ///
    /// The re-dispatch re-enters [`process`](Self::process); the items are
    /// tagged, so they either match another live worker's flow (and queue on
    /// its backlog) or are handed out directly. The recursion cannot deepen
    /// past another concurrently departing worker because the returns ring
    /// is mutated in place rather than through cursors held across the call.
    fn handle_worker_shutdown(&mut self, wkr: usize) {
        self.metrics.worker_shutdowns += 1;
        self.in_flight_tags[wkr] = 0;
        // Zero cell: no outstanding request, worker absent.
        self.shared.slot(wkr).store(0);

        if !self.backlogs[wkr].is_empty() {
            tracing::debug!(
                worker = wkr,
                queued = self.backlogs[wkr].len(),
                "worker left service; re-dispatching its backlog"
            );
            let mut pkts = Vec::with_capacity(self.backlogs[wkr].len());
            while let Some(queued) = self.backlogs[wkr].pop() {
                // SAFETY: backlog entries are encoded Box pointers that were
                // never delivered; ownership comes back exactly once here.
                pkts.push(unsafe { Box::from_raw(slot::decode_ptr::<P>(queued)) });
            }
            self.backlogs[wkr].reset();
            self.process(pkts);
        } else {
            tracing::debug!(worker = wkr, "worker left service");
        }
    }

    #[inline]
    fn store_return(&mut self, pkt: *mut P) {
        self.metrics.returns_stored += u64::from(!pkt.is_null());
        self.returns.store(pkt);
    }

    /// Packets in flight or queued: the sum over workers of backlog depth
    /// plus one for a nonzero in-flight tag.
    pub fn total_outstanding(&self) -> usize {
        self.backlogs
            .iter()
            .zip(self.in_flight_tags.iter())
            .map(|(bl, &tag)| bl.len() + usize::from(tag != 0))
            .sum()
    }

    /// Runs returns-only sweeps until no packet is in flight or queued,
    /// then reports how many were outstanding when the call began.
    ///
    /// Quiescence needs the workers to keep making progress; a worker
    /// sitting on a delivered packet forever keeps `flush` spinning.
    pub fn flush(&mut self) -> usize {
        let outstanding = self.total_outstanding();
        while self.total_outstanding() > 0 {
            self.process_returns();
        }
        self.metrics.flushes += 1;
        tracing::debug!(outstanding, "flushed to quiescence");
        outstanding
    }

    /// Moves up to `max` worker-returned packets back to the caller, oldest
    /// first.
    pub fn returned_pkts(&mut self, max: usize) -> Vec<Box<P>> {
        self.returns.drain(max)
    }

    /// Drops every packet currently held in the returns ring.
    pub fn clear_returns(&mut self) {
        self.returns.clear();
    }

    /// Snapshot of the dispatch counters.
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// The registered instance name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of worker slots in this instance.
    pub fn num_workers(&self) -> usize {
        self.shared.num_workers
    }
}

impl<P: FlowHash> Drop for Distributor<P> {
    fn drop(&mut self) {
        // Backlogged packets were never delivered; they still belong to the
        // dispatcher side. The returns ring reclaims its own contents.
        for bl in self.backlogs.iter_mut() {
            while let Some(queued) = bl.pop() {
                // SAFETY: same provenance argument as in the shutdown path.
                unsafe { drop(Box::from_raw(slot::decode_ptr::<P>(queued))) };
            }
        }
    }
}

impl<P: FlowHash> std::fmt::Debug for Distributor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("name", &self.shared.name)
            .field("num_workers", &self.shared.num_workers)
            .field("outstanding", &self.total_outstanding())
            .field("returns_held", &self.returns.len())
            .finish()
    }
}
