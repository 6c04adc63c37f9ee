//! Four worker threads checksum packets from sixteen flows while the main
//! thread dispatches, drains returns, and finally retires the pool.
//!
//! Run with: `cargo run --example flow_pipeline`

use flowdist::{Config, Distributor, DistributorError, FlowHash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

struct Packet {
    flow: u32,
    payload: u64,
}

impl FlowHash for Packet {
    fn flow_hash(&self) -> u32 {
        self.flow
    }
}

fn main() -> Result<(), DistributorError> {
    const WORKERS: usize = 4;
    const FLOWS: u32 = 16;
    const PACKETS: u32 = 1024;

    let (mut dist, workers) = Distributor::new(Config::new("flow-pipeline", WORKERS))?;
    let stop = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = workers
        .into_iter()
        .map(|mut worker: flowdist::Worker<Packet>| {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut processed = 0u32;
                let mut checksum = 0u64;
                worker.request(None);
                while !stop.load(Ordering::Acquire) {
                    if let Some(p) = worker.poll() {
                        processed += 1;
                        checksum = checksum.wrapping_add(p.payload);
                        worker.request(Some(p));
                    } else {
                        thread::yield_now();
                    }
                }
                worker.return_pkt(None);
                (processed, checksum)
            })
        })
        .collect();

    let batch: Vec<_> = (0..PACKETS)
        .map(|i| {
            Box::new(Packet {
                flow: i % FLOWS,
                payload: u64::from(i),
            })
        })
        .collect();
    dist.process(batch);

    // Drain returns while driving the backlogs; the returns ring is lossy,
    // so letting it sit until the end would overwrite the oldest handbacks.
    let mut done = Vec::new();
    while dist.total_outstanding() > 0 {
        dist.process(Vec::new());
        done.extend(dist.returned_pkts(64));
    }
    done.extend(dist.returned_pkts(usize::MAX));

    stop.store(true, Ordering::Release);
    for (id, handle) in handles.into_iter().enumerate() {
        let (processed, checksum) = handle.join().expect("worker panicked");
        println!("worker {id}: {processed} packets, checksum {checksum:#x}");
    }

    // Acknowledge the four departures.
    dist.process(Vec::new());
    done.extend(dist.returned_pkts(usize::MAX));

    println!("{} of {PACKETS} packets back with the caller", done.len());
    println!("{:?}", dist.metrics());
    Ok(())
}
