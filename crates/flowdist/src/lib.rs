//! flowdist - Flow-Affine Packet Distributor
//!
//! A single-dispatcher, many-worker packet distributor for line-rate
//! workloads. One thread feeds batches of packets in; a fixed set of worker
//! threads pull them out through per-worker, single-slot exchange cells.
//! Packets sharing a 32-bit flow hash are serviced by at most one worker at
//! a time, in submission order, so parallelism never reorders a flow.
//!
//! # Key Features
//!
//! - Lock-free hot path: one 64-bit cell per worker, plain acquire/release
//!   loads and stores, no read-modify-write
//! - Flow affinity via an in-flight tag table and bounded per-worker
//!   backlogs (no work stealing, strictly round-robin otherwise)
//! - Three-cache-line slot padding (adjacent-line prefetcher false sharing
//!   elimination)
//! - Worker shutdown protocol that re-routes a departing worker's queue
//! - Optional NUMA-bound slot memory (`numa` feature)
//!
//! # Example
//!
//! ```
//! use flowdist::{Config, Distributor, FlowHash};
//!
//! struct Packet {
//!     flow: u32,
//!     payload: u32,
//! }
//!
//! impl FlowHash for Packet {
//!     fn flow_hash(&self) -> u32 {
//!         self.flow
//!     }
//! }
//!
//! let (mut dist, mut workers) = Distributor::<Packet>::new(Config::new("doc", 2))?;
//! let mut worker = workers.remove(0);
//!
//! // The worker asks for work; the dispatcher feeds a batch.
//! worker.request(None);
//! dist.process(vec![Box::new(Packet { flow: 7, payload: 1 })]);
//! let pkt = worker.poll().expect("delivered");
//! assert_eq!(pkt.payload, 1);
//!
//! // Finished packets ride back on the next request and are drained here.
//! worker.request(Some(pkt));
//! dist.process(Vec::new());
//! assert_eq!(dist.returned_pkts(8).len(), 1);
//! # Ok::<(), flowdist::DistributorError>(())
//! ```

mod backlog;
mod backoff;
mod config;
mod dispatch;
mod error;
mod invariants;
mod metrics;
mod region;
pub mod registry;
mod returns;
mod slot;
mod worker;

pub use backoff::Backoff;
pub use config::{Config, BACKLOG_SIZE, MAX_NUMA_NODES, MAX_RETURNS, MAX_WORKERS, NAME_MAX};
pub use dispatch::{Distributor, FlowHash};
pub use error::DistributorError;
pub use metrics::Metrics;
pub use worker::Worker;
