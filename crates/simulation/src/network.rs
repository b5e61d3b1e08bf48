//! Local transport and network configuration.

use hybrid_core::{Envelope, Transport};
use hybrid_types::ReplicaId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use tracing::trace;

/// Shape of the in-process cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Number of replicas.
    pub replicas: usize,

    /// Replica whose executions have real side effects.
    pub local_replica: u64,

    /// Seed for shuffled delivery. `None` delivers in send order.
    pub shuffle_seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            replicas: 4,
            local_replica: 0,
            shuffle_seed: None,
        }
    }
}

impl NetworkConfig {
    /// Set the replica count.
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the local replica.
    pub fn with_local_replica(mut self, replica: u64) -> Self {
        self.local_replica = replica;
        self
    }

    /// Shuffle delivery order with a seeded RNG.
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }
}

/// In-process message queue.
///
/// Messages to or from a partitioned replica are dropped, except loopback.
pub struct LocalTransport {
    queue: VecDeque<Envelope>,
    rng: Option<ChaCha8Rng>,
    partitioned: BTreeSet<ReplicaId>,
    dropped: u64,
}

impl LocalTransport {
    /// FIFO delivery.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            rng: None,
            partitioned: BTreeSet::new(),
            dropped: 0,
        }
    }

    /// Deterministically shuffled delivery.
    pub fn shuffled(seed: u64) -> Self {
        Self {
            rng: Some(ChaCha8Rng::seed_from_u64(seed)),
            ..Self::new()
        }
    }

    /// Build from a network config.
    pub fn from_config(config: &NetworkConfig) -> Self {
        match config.shuffle_seed {
            Some(seed) => Self::shuffled(seed),
            None => Self::new(),
        }
    }

    /// Cut a replica off from its peers.
    pub fn partition(&mut self, replica: ReplicaId) {
        self.partitioned.insert(replica);
    }

    /// Reconnect every replica.
    pub fn heal(&mut self) {
        self.partitioned.clear();
    }

    /// Whether a replica is cut off.
    pub fn is_partitioned(&self, replica: ReplicaId) -> bool {
        self.partitioned.contains(&replica)
    }

    /// Messages dropped by partitions.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn blocked(&self, envelope: &Envelope) -> bool {
        !envelope.is_loopback()
            && (self.partitioned.contains(&envelope.from)
                || self.partitioned.contains(&envelope.to))
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LocalTransport {
    fn send(&mut self, envelope: Envelope) {
        if self.blocked(&envelope) {
            trace!(
                from = envelope.from.0,
                to = envelope.to.0,
                msg_type = envelope.type_name(),
                "Dropped by partition"
            );
            self.dropped += 1;
            return;
        }
        self.queue.push_back(envelope);
    }

    fn next_delivery(&mut self) -> Option<Envelope> {
        match self.rng.as_mut() {
            Some(rng) if self.queue.len() > 1 => {
                let index = rng.gen_range(0..self.queue.len());
                self.queue.remove(index)
            }
            _ => self.queue.pop_front(),
        }
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}
