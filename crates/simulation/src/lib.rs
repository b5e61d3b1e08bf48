//! In-process replica cluster.
//!
//! Every replica is an independent [`hybrid_pbft::PbftState`]; broadcasts are
//! expanded into one [`hybrid_core::Envelope`] per recipient and delivered
//! through a [`LocalTransport`]. Given the same shuffle seed, delivery order
//! is identical every run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulatedCluster                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     LocalTransport (VecDeque<Envelope>)            │ │
//! │  │     FIFO, or seeded ChaCha shuffle; partitions     │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     replicas: Vec<PbftState>                       │ │
//! │  │     Each processes events sequentially             │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Broadcasts → transport; the rest → outputs     │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod cluster;
mod network;

pub use cluster::{ClusterError, ClusterOutput, SimulatedCluster, SimulationStats};
pub use network::{LocalTransport, NetworkConfig};
