//! Replica membership as seen by one replica.

use crate::{quorum, FaultTolerance, ReplicaId, SequenceNumber, ViewNumber};

/// Errors building a replica set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplicaSetError {
    /// No replicas were given.
    #[error("Replica set is empty")]
    Empty,

    /// The local replica is not part of the set.
    #[error("Local replica {0} is not a member of the replica set")]
    NotAMember(ReplicaId),

    /// The same replica appears twice.
    #[error("Replica {0} appears more than once")]
    Duplicate(ReplicaId),
}

/// Ordered replica identities plus the local replica's view of the protocol
/// counters.
///
/// The primary of view `v` is `replicas[v mod n]`.
#[derive(Debug, Clone)]
pub struct ReplicaSetView {
    replicas: Vec<ReplicaId>,
    local: ReplicaId,
    view: ViewNumber,
    highest_sequence: SequenceNumber,
    last_checkpoint: SequenceNumber,
}

impl ReplicaSetView {
    /// Create a replica set at view 0 with no sequence assigned.
    pub fn new(replicas: Vec<ReplicaId>, local: ReplicaId) -> Result<Self, ReplicaSetError> {
        if replicas.is_empty() {
            return Err(ReplicaSetError::Empty);
        }
        for (i, r) in replicas.iter().enumerate() {
            if replicas[..i].contains(r) {
                return Err(ReplicaSetError::Duplicate(*r));
            }
        }
        if !replicas.contains(&local) {
            return Err(ReplicaSetError::NotAMember(local));
        }
        Ok(Self {
            replicas,
            local,
            view: ViewNumber::INITIAL,
            highest_sequence: SequenceNumber::ZERO,
            last_checkpoint: SequenceNumber::ZERO,
        })
    }

    /// Replicas `0..n`, seen from `local`.
    pub fn with_count(n: usize, local: ReplicaId) -> Result<Self, ReplicaSetError> {
        Self::new((0..n as u64).map(ReplicaId).collect(), local)
    }

    /// All replicas in order.
    pub fn replicas(&self) -> &[ReplicaId] {
        &self.replicas
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Always false; construction rejects empty sets.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// The local replica.
    pub fn local(&self) -> ReplicaId {
        self.local
    }

    /// Whether a replica belongs to the set.
    pub fn contains(&self, replica: ReplicaId) -> bool {
        self.replicas.contains(&replica)
    }

    /// Current view.
    pub fn view(&self) -> ViewNumber {
        self.view
    }

    /// Index of the primary for a view.
    pub fn primary_index_for(&self, view: ViewNumber) -> usize {
        (view.0 % self.replicas.len() as u64) as usize
    }

    /// Primary for a view.
    pub fn primary_for(&self, view: ViewNumber) -> ReplicaId {
        self.replicas[self.primary_index_for(view)]
    }

    /// Index of the current primary.
    pub fn primary_index(&self) -> usize {
        self.primary_index_for(self.view)
    }

    /// Current primary.
    pub fn primary(&self) -> ReplicaId {
        self.primary_for(self.view)
    }

    /// Whether the local replica is the current primary.
    pub fn is_primary(&self) -> bool {
        self.primary() == self.local
    }

    /// Move to the next view and return it.
    pub fn advance_view(&mut self) -> ViewNumber {
        self.view = self.view.next();
        self.view
    }

    /// Adopt a view announced by a peer. Returns false if it is not newer.
    pub fn adopt_view(&mut self, view: ViewNumber) -> bool {
        if view <= self.view {
            return false;
        }
        self.view = view;
        true
    }

    /// Highest sequence assigned or observed.
    pub fn highest_sequence(&self) -> SequenceNumber {
        self.highest_sequence
    }

    /// Assign the next sequence number. Only the primary calls this.
    pub fn next_sequence(&mut self) -> SequenceNumber {
        self.highest_sequence = self.highest_sequence.next();
        self.highest_sequence
    }

    /// Record a sequence seen from a peer so numbering stays monotonic
    /// across view changes.
    pub fn observe_sequence(&mut self, sequence: SequenceNumber) {
        if sequence > self.highest_sequence {
            self.highest_sequence = sequence;
        }
    }

    /// Sequence of the latest checkpoint.
    pub fn last_checkpoint(&self) -> SequenceNumber {
        self.last_checkpoint
    }

    /// Record a checkpoint. Older checkpoints are ignored.
    pub fn set_last_checkpoint(&mut self, sequence: SequenceNumber) {
        if sequence > self.last_checkpoint {
            self.last_checkpoint = sequence;
        }
    }

    /// Matching messages required per phase.
    pub fn required_messages(&self) -> usize {
        quorum::required_messages(self.replicas.len())
    }

    /// Fault-tolerance summary.
    pub fn fault_tolerance(&self) -> FaultTolerance {
        FaultTolerance::for_replicas(self.replicas.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_membership() {
        assert_eq!(
            ReplicaSetView::new(vec![], ReplicaId(0)).unwrap_err(),
            ReplicaSetError::Empty
        );
        assert_eq!(
            ReplicaSetView::with_count(4, ReplicaId(9)).unwrap_err(),
            ReplicaSetError::NotAMember(ReplicaId(9))
        );
        assert_eq!(
            ReplicaSetView::new(vec![ReplicaId(1), ReplicaId(1)], ReplicaId(1)).unwrap_err(),
            ReplicaSetError::Duplicate(ReplicaId(1))
        );
    }

    #[test]
    fn test_primary_rotation() {
        let mut set = ReplicaSetView::with_count(4, ReplicaId(2)).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(set.primary());
            set.advance_view();
        }
        assert_eq!(
            seen,
            vec![ReplicaId(0), ReplicaId(1), ReplicaId(2), ReplicaId(3)]
        );
        assert_eq!(set.view(), ViewNumber(4));
        assert_eq!(set.primary(), ReplicaId(0));
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let mut set = ReplicaSetView::with_count(4, ReplicaId(0)).unwrap();
        assert_eq!(set.next_sequence(), SequenceNumber(1));
        set.observe_sequence(SequenceNumber(7));
        set.observe_sequence(SequenceNumber(3));
        assert_eq!(set.next_sequence(), SequenceNumber(8));
    }

    #[test]
    fn test_adopt_view_only_moves_forward() {
        let mut set = ReplicaSetView::with_count(4, ReplicaId(0)).unwrap();
        assert!(set.adopt_view(ViewNumber(2)));
        assert!(!set.adopt_view(ViewNumber(2)));
        assert!(!set.adopt_view(ViewNumber(1)));
        assert_eq!(set.primary(), ReplicaId(2));
    }
}
