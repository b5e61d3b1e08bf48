//! Checkpoint bookkeeping.

use hybrid_types::{CheckpointSnapshot, ReplicaId, SequenceNumber};
use std::collections::{BTreeMap, BTreeSet};

/// Local checkpoints and the peers that announced matching ones.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    snapshots: BTreeMap<SequenceNumber, CheckpointSnapshot>,
    attestations: BTreeMap<SequenceNumber, BTreeSet<ReplicaId>>,
    stable: SequenceNumber,
}

impl CheckpointStore {
    /// Record a local snapshot.
    pub fn record(&mut self, snapshot: CheckpointSnapshot) {
        self.snapshots.insert(snapshot.sequence, snapshot);
    }

    /// Record that `replica` announced a checkpoint at `sequence`.
    ///
    /// Returns true the first time `required` replicas have announced it;
    /// the checkpoint is then stable.
    pub fn attest(
        &mut self,
        sequence: SequenceNumber,
        replica: ReplicaId,
        required: usize,
    ) -> bool {
        let voters = self.attestations.entry(sequence).or_default();
        voters.insert(replica);
        if voters.len() >= required && sequence > self.stable {
            self.stable = sequence;
            return true;
        }
        false
    }

    /// Latest local snapshot.
    pub fn latest(&self) -> Option<&CheckpointSnapshot> {
        self.snapshots.values().next_back()
    }

    /// Snapshot at a sequence.
    pub fn get(&self, sequence: SequenceNumber) -> Option<&CheckpointSnapshot> {
        self.snapshots.get(&sequence)
    }

    /// Number of retained snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no snapshots are retained.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Highest checkpoint announced by a quorum.
    pub fn stable(&self) -> SequenceNumber {
        self.stable
    }

    /// Drop snapshots and attestations at or below `cutoff`.
    pub fn discard_through(&mut self, cutoff: SequenceNumber) {
        self.snapshots.retain(|seq, _| *seq > cutoff);
        self.attestations.retain(|seq, _| *seq > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_types::ViewNumber;

    fn snapshot(seq: u64) -> CheckpointSnapshot {
        CheckpointSnapshot {
            view: ViewNumber(0),
            sequence: SequenceNumber(seq),
            primary: ReplicaId(0),
            created_at_ms: 0,
        }
    }

    #[test]
    fn test_stable_after_quorum() {
        let mut store = CheckpointStore::default();
        assert!(!store.attest(SequenceNumber(100), ReplicaId(0), 3));
        assert!(!store.attest(SequenceNumber(100), ReplicaId(1), 3));
        assert!(!store.attest(SequenceNumber(100), ReplicaId(1), 3));
        assert!(store.attest(SequenceNumber(100), ReplicaId(2), 3));
        assert!(!store.attest(SequenceNumber(100), ReplicaId(3), 3));
        assert_eq!(store.stable(), SequenceNumber(100));
    }

    #[test]
    fn test_discard_keeps_newer() {
        let mut store = CheckpointStore::default();
        store.record(snapshot(100));
        store.record(snapshot(200));
        store.record(snapshot(300));
        store.discard_through(SequenceNumber(200));
        assert_eq!(store.len(), 1);
        assert_eq!(store.latest().map(|s| s.sequence), Some(SequenceNumber(300)));
        assert!(store.get(SequenceNumber(100)).is_none());
    }
}
