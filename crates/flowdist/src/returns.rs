use crate::config::{MAX_RETURNS, RETURNS_MASK};
use crate::invariants::debug_assert_returns_saturated;
use std::ptr;

/// Circular buffer of packets handed back by workers, drained by the caller.
///
/// Owned exclusively by the dispatcher thread. The ring is lossy by design:
/// once `count` saturates at [`RETURNS_MASK`], each further insert advances
/// `start` and the oldest packet is dropped. Callers that care about every
/// return drain it frequently.
pub(crate) struct ReturnsRing<P> {
    start: usize,
    count: usize,
    slots: [*mut P; MAX_RETURNS],
}

impl<P> ReturnsRing<P> {
    pub(crate) const fn new() -> Self {
        Self {
            start: 0,
            count: 0,
            slots: [ptr::null_mut(); MAX_RETURNS],
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    /// Inserts a returned packet; null is a no-op.
    ///
    /// The index and counter arithmetic is branch-free, mirroring the fact
    /// that a null `pkt` still writes the (free) slot but advances nothing.
    /// The single branch reclaims the evicted packet once saturated.
    #[inline]
    pub(crate) fn store(&mut self, pkt: *mut P) {
        let nonzero = usize::from(!pkt.is_null());
        let evict = usize::from(self.count == RETURNS_MASK) & nonzero;
        self.slots[(self.start + self.count) & RETURNS_MASK] = pkt;
        if evict != 0 {
            // Saturated: the oldest entry leaves the live window and must
            // be dropped, not merely forgotten.
            let oldest = self.slots[self.start & RETURNS_MASK];
            // SAFETY: every pointer inside the live window came from
            // `Box::into_raw` and is non-null by the `nonzero` gating above.
            unsafe { drop(Box::from_raw(oldest)) };
        }
        self.start += evict;
        self.count += usize::from(self.count != RETURNS_MASK) & nonzero;
        debug_assert_returns_saturated!(self.count, RETURNS_MASK);
    }

    /// Moves up to `max` packets out of the ring, oldest first.
    pub(crate) fn drain(&mut self, max: usize) -> Vec<Box<P>> {
        let n = max.min(self.count);
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let pkt = self.slots[(self.start + i) & RETURNS_MASK];
            // SAFETY: packets in the live window are non-null and were
            // leaked into the ring via `Box::into_raw`; ownership moves
            // back out exactly once because `start` advances below.
            out.push(unsafe { Box::from_raw(pkt) });
        }
        self.start += n;
        self.count -= n;
        out
    }

    /// Drops every held packet and rewinds the cursors.
    pub(crate) fn clear(&mut self) {
        drop(self.drain(self.count));
        self.start = 0;
        self.count = 0;
    }
}

impl<P> Drop for ReturnsRing<P> {
    fn drop(&mut self) {
        self.clear();
    }
}
