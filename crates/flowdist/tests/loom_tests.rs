//! Loom-based concurrency tests for the exchange-cell protocol.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores thread interleavings. We model the single-slot
//! protocol in isolation (one dispatcher, one worker, one cell) so the state
//! space stays tractable; the orderings under test are exactly the ones the
//! real cell uses.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicI64, Ordering};
use loom::sync::Arc;
use loom::thread;

const FLAG_BITS: u32 = 4;
const FLAG_GET: i64 = 0x01;
const FLAG_RETURN: i64 = 0x02;
const FLAG_MASK: i64 = 0x0f;

struct LoomSlot {
    cell: AtomicI64,
}

impl LoomSlot {
    fn new() -> Self {
        Self {
            cell: AtomicI64::new(0),
        }
    }
}

/// A published GET must surface the returned payload intact, and a delivery
/// must surface the delivered pointer intact.
#[test]
fn loom_request_and_delivery_are_atomic() {
    loom::model(|| {
        const RETURNED: i64 = 0x40;
        const DELIVERED: i64 = 0x80;

        let slot = Arc::new(LoomSlot::new());
        let worker_slot = Arc::clone(&slot);

        let worker = thread::spawn(move || {
            worker_slot
                .cell
                .store((RETURNED << FLAG_BITS) | FLAG_GET, Ordering::Release);
            for _ in 0..10 {
                let data = worker_slot.cell.load(Ordering::Acquire);
                if data & FLAG_GET == 0 {
                    // Delivery observed: the payload must be exactly what
                    // the dispatcher published, never a torn mix.
                    assert_eq!(data >> FLAG_BITS, DELIVERED);
                    return true;
                }
                thread::yield_now();
            }
            false
        });

        let mut captured = None;
        for _ in 0..10 {
            let data = slot.cell.load(Ordering::Acquire);
            if data & FLAG_GET != 0 {
                captured = Some(data >> FLAG_BITS);
                slot.cell.store(DELIVERED << FLAG_BITS, Ordering::Release);
                break;
            }
            thread::yield_now();
        }

        if let Some(old) = captured {
            assert_eq!(old, RETURNED);
        }
        worker.join().unwrap();
    });
}

/// A RETURN publication carries the final packet; the dispatcher either
/// sees the whole message or nothing.
#[test]
fn loom_shutdown_return_visible() {
    loom::model(|| {
        const FINAL: i64 = 0xc0;

        let slot = Arc::new(LoomSlot::new());
        let worker_slot = Arc::clone(&slot);

        let worker = thread::spawn(move || {
            worker_slot
                .cell
                .store((FINAL << FLAG_BITS) | FLAG_RETURN, Ordering::Release);
        });

        for _ in 0..10 {
            let data = slot.cell.load(Ordering::Acquire);
            if data & FLAG_RETURN != 0 {
                assert_eq!(data >> FLAG_BITS, FINAL);
                // Acknowledge: clear the cell to the worker-absent state.
                slot.cell.store(0, Ordering::Release);
                break;
            }
            thread::yield_now();
        }

        worker.join().unwrap();
        let final_state = slot.cell.load(Ordering::Acquire);
        // Either acknowledged (zero) or still the intact RETURN message.
        assert!(final_state == 0 || final_state == ((FINAL << FLAG_BITS) | FLAG_RETURN));
    });
}

/// Full exchange cycle: request, delivery, handback. The handback observed
/// by the dispatcher must be the packet it delivered.
#[test]
fn loom_full_exchange_cycle() {
    loom::model(|| {
        const DELIVERED: i64 = 0x80;

        let slot = Arc::new(LoomSlot::new());
        let worker_slot = Arc::clone(&slot);

        let worker = thread::spawn(move || {
            worker_slot.cell.store(FLAG_GET, Ordering::Release);
            for _ in 0..10 {
                let data = worker_slot.cell.load(Ordering::Acquire);
                if (data & FLAG_MASK) == 0 && data != 0 {
                    // Consume the delivery and hand it straight back.
                    worker_slot
                        .cell
                        .store(data | FLAG_GET, Ordering::Release);
                    return true;
                }
                thread::yield_now();
            }
            false
        });

        let mut delivered = false;
        let mut handback = None;
        for _ in 0..20 {
            let data = slot.cell.load(Ordering::Acquire);
            if data & FLAG_GET != 0 {
                if delivered {
                    handback = Some(data >> FLAG_BITS);
                    break;
                }
                // First request carries no payload.
                assert_eq!(data >> FLAG_BITS, 0);
                slot.cell.store(DELIVERED << FLAG_BITS, Ordering::Release);
                delivered = true;
            }
            thread::yield_now();
        }

        let cycled = worker.join().unwrap();
        if cycled {
            if let Some(h) = handback {
                assert_eq!(h, DELIVERED);
            }
        }
    });
}
