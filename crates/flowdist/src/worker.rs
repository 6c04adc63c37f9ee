use crate::backoff::Backoff;
use crate::dispatch::{FlowHash, Shared};
use crate::slot::{self, FLAG_GET, FLAG_RETURN};
use std::ptr;
use std::sync::Arc;

/// Worker-side endpoint of one exchange slot.
///
/// Exactly one handle exists per worker id, created by
/// [`Distributor::new`](crate::Distributor::new). A handle may move to
/// another thread, but the protocol assumes a single thread drives it,
/// which the `&mut self` methods plus the absence of `Clone` guarantee.
///
/// A worker must consume each delivery (via [`poll`](Self::poll) or
/// [`get`](Self::get)) before issuing the next request; requesting over an
/// unconsumed delivery forfeits that packet, exactly as it would on the
/// wire-level protocol.
pub struct Worker<P: FlowHash> {
    shared: Arc<Shared<P>>,
    id: usize,
    /// Whether a request has been published and its delivery not yet
    /// consumed. Lets `poll` distinguish "new delivery" from "cell still
    /// holding the one we already took", so one packet can never be
    /// materialized twice.
    outstanding: bool,
}

// Note: Worker intentionally does NOT implement Clone. Two handles for one
// slot would let two threads run the worker half of the protocol at once,
// and the single-slot cell cannot arbitrate that.

impl<P: FlowHash> Worker<P> {
    pub(crate) fn new(shared: Arc<Shared<P>>, id: usize) -> Self {
        Self {
            shared,
            id,
            outstanding: false,
        }
    }

    /// This worker's id (its slot index).
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Publishes a request for a new packet, handing back `oldpkt` (the
    /// packet just finished, or `None` on the first call).
    ///
    /// Spins (with PAUSE hints) while the previous request is still
    /// unserviced; returns as soon as the request is published, without
    /// waiting for the delivery.
    pub fn request(&mut self, oldpkt: Option<Box<P>>) {
        let slot = self.shared.slot(self.id);
        let old = oldpkt.map_or(ptr::null_mut(), Box::into_raw);
        let req = slot::encode(old, FLAG_GET);

        // A nonzero flag means the dispatcher has not yet observed the
        // previous publication; overwriting it would lose a message.
        let mut backoff = Backoff::new();
        while slot::flags(slot.load()) != 0 {
            backoff.snooze();
        }
        slot.store(req);
        self.outstanding = true;
    }

    /// Checks for a delivery without blocking.
    ///
    /// Returns `None` while the request is unserviced (slot still flagged
    /// GET), when no request is outstanding, or after a shutdown cleared the
    /// slot.
    pub fn poll(&mut self) -> Option<Box<P>> {
        if !self.outstanding {
            return None;
        }
        let data = self.shared.slot(self.id).load();
        if slot::flags(data) & FLAG_GET != 0 {
            return None;
        }
        let pkt = slot::decode_ptr::<P>(data);
        if pkt.is_null() {
            return None;
        }
        self.outstanding = false;
        // SAFETY: a nonzero pointer with the flag cleared is a delivery the
        // dispatcher published for this worker; `outstanding` went false
        // above, so this cell value is materialized exactly once.
        Some(unsafe { Box::from_raw(pkt) })
    }

    /// Requests a packet and spins until one is delivered.
    ///
    /// The spin is uninterruptible; workers that need cancellation should
    /// drive [`request`](Self::request)/[`poll`](Self::poll) from their own
    /// control loop instead.
    pub fn get(&mut self, oldpkt: Option<Box<P>>) -> Box<P> {
        self.request(oldpkt);
        let mut backoff = Backoff::new();
        loop {
            if let Some(pkt) = self.poll() {
                return pkt;
            }
            backoff.snooze();
        }
    }

    /// Hands back `oldpkt` and leaves service.
    ///
    /// Consumes the handle: a departed worker must never touch its slot
    /// again. The dispatcher acknowledges the departure on its next pass and
    /// re-routes anything still queued for this worker.
    pub fn return_pkt(self, oldpkt: Option<Box<P>>) {
        let slot = self.shared.slot(self.id);
        let old = oldpkt.map_or(ptr::null_mut(), Box::into_raw);
        slot.store(slot::encode(old, FLAG_RETURN));
        tracing::debug!(worker = self.id, "worker signalled shutdown");
    }
}

impl<P: FlowHash> std::fmt::Debug for Worker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("outstanding", &self.outstanding)
            .finish()
    }
}
