//! Addressed messages in flight between replicas.

use hybrid_types::{ConsensusMessage, Phase, ReplicaId};

/// A message addressed to a single replica.
///
/// Broadcasts are expanded into one envelope per recipient by the transport
/// runner, so each recipient can be delayed, reordered or dropped
/// independently.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Sending replica.
    pub from: ReplicaId,
    /// Receiving replica.
    pub to: ReplicaId,
    /// The message.
    pub message: ConsensusMessage,
}

impl Envelope {
    /// Address a message.
    pub fn new(from: ReplicaId, to: ReplicaId, message: ConsensusMessage) -> Self {
        Self { from, to, message }
    }

    /// Get a human-readable name for the carried message type.
    pub fn type_name(&self) -> &'static str {
        match self.message.phase() {
            Phase::PrePrepare => "PrePrepare",
            Phase::Prepare => "Prepare",
            Phase::Commit => "Commit",
            Phase::Reply => "Reply",
            Phase::ViewChange => "ViewChange",
            Phase::Checkpoint => "Checkpoint",
        }
    }

    /// Check if this is an ordering vote (prepare or commit).
    pub fn is_vote(&self) -> bool {
        matches!(self.message.phase(), Phase::Prepare | Phase::Commit)
    }

    /// Check if this is a loopback message.
    pub fn is_loopback(&self) -> bool {
        self.from == self.to
    }
}
