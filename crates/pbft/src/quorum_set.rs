//! Per-digest vote collection.

use hybrid_types::{ReplicaId, SequenceNumber, Slot};
use std::collections::BTreeMap;

/// A single PREPARE or COMMIT from one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteRecord {
    /// Slot the vote was cast for.
    pub slot: Slot,
    /// Time the vote was sent, in milliseconds.
    pub timestamp_ms: u64,
}

/// PREPARE or COMMIT votes for one digest, at most one per replica.
///
/// Votes are tagged with the slot they were cast for; a quorum only counts
/// votes matching the slot the digest was pre-prepared in.
#[derive(Debug, Clone, Default)]
pub struct QuorumSet {
    votes: BTreeMap<ReplicaId, VoteRecord>,
}

impl QuorumSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote. Returns false if the replica already voted; the first
    /// vote is kept.
    pub fn insert(&mut self, replica: ReplicaId, slot: Slot, timestamp_ms: u64) -> bool {
        if self.votes.contains_key(&replica) {
            return false;
        }
        self.votes.insert(replica, VoteRecord { slot, timestamp_ms });
        true
    }

    /// Number of distinct replicas that voted for `slot`.
    pub fn count_matching(&self, slot: Slot) -> usize {
        self.votes.values().filter(|v| v.slot == slot).count()
    }

    /// Whether `required` distinct replicas voted for `slot`.
    pub fn has_quorum(&self, slot: Slot, required: usize) -> bool {
        self.count_matching(slot) >= required
    }

    /// Whether a replica has voted.
    pub fn has_voted(&self, replica: ReplicaId) -> bool {
        self.votes.contains_key(&replica)
    }

    /// Total votes, regardless of slot.
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    /// Whether no votes are recorded.
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Replicas that voted for `slot`, in id order.
    pub fn voters_for(&self, slot: Slot) -> Vec<ReplicaId> {
        self.votes
            .iter()
            .filter(|(_, v)| v.slot == slot)
            .map(|(r, _)| *r)
            .collect()
    }

    /// Drop votes with sequence at or below `cutoff`.
    pub fn discard_through(&mut self, cutoff: SequenceNumber) {
        self.votes.retain(|_, v| v.slot.sequence > cutoff);
    }
}
