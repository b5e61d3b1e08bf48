//! Agreement protocol messages.

use crate::{
    Hash, OperationResult, ReplicaId, SequenceNumber, Slot, TransactionRequest, ViewNumber,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol phase a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Primary binds a digest to a slot.
    PrePrepare,
    /// Replica accepted the binding.
    Prepare,
    /// Replica saw a prepare quorum.
    Commit,
    /// Replica executed the request.
    Reply,
    /// Replica moved to a new view.
    ViewChange,
    /// Replica took a bookkeeping checkpoint.
    Checkpoint,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::PrePrepare => "PRE_PREPARE",
            Phase::Prepare => "PREPARE",
            Phase::Commit => "COMMIT",
            Phase::Reply => "REPLY",
            Phase::ViewChange => "VIEW_CHANGE",
            Phase::Checkpoint => "CHECKPOINT",
        };
        f.write_str(name)
    }
}

/// Per-digest progress through the protocol.
///
/// Ordered so that `status >= RequestStatus::Prepared` means "at least
/// prepared".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Nothing known about the digest.
    #[default]
    None,
    /// Pre-prepare accepted.
    PrePrepared,
    /// Prepare quorum reached.
    Prepared,
    /// Commit quorum reached.
    Committed,
    /// Executed and replied.
    Executed,
}

/// Bookkeeping snapshot taken at a checkpoint.
///
/// Bounds protocol memory only; it does not capture application state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    /// View at the time of the checkpoint.
    pub view: ViewNumber,
    /// Sequence the checkpoint was taken at.
    pub sequence: SequenceNumber,
    /// Primary of that view.
    pub primary: ReplicaId,
    /// Creation time in milliseconds.
    pub created_at_ms: u64,
}

/// Phase-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageBody {
    /// Carries the full request being ordered.
    PrePrepare {
        /// The ordered request.
        request: TransactionRequest,
    },
    /// Agreement on the slot binding.
    Prepare,
    /// Agreement to execute.
    Commit,
    /// Execution outcome.
    Reply {
        /// Result of the business operation.
        outcome: OperationResult,
    },
    /// Announcement of a new view.
    ViewChange,
    /// Announcement of a checkpoint.
    Checkpoint {
        /// The snapshot taken.
        snapshot: CheckpointSnapshot,
    },
}

/// A message exchanged between replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusMessage {
    /// View the message was sent in.
    pub view: ViewNumber,
    /// Sequence the message refers to.
    pub sequence: SequenceNumber,
    /// Request digest (zero for view-change and checkpoint messages).
    pub digest: Hash,
    /// Sending replica.
    pub sender: ReplicaId,
    /// Send time in milliseconds.
    pub timestamp_ms: u64,
    /// Phase-specific payload.
    pub body: MessageBody,
}

impl ConsensusMessage {
    /// Create a pre-prepare for a request.
    pub fn pre_prepare(
        slot: Slot,
        digest: Hash,
        sender: ReplicaId,
        timestamp_ms: u64,
        request: TransactionRequest,
    ) -> Self {
        Self::new(
            slot,
            digest,
            sender,
            timestamp_ms,
            MessageBody::PrePrepare { request },
        )
    }

    /// Create a prepare vote.
    pub fn prepare(slot: Slot, digest: Hash, sender: ReplicaId, timestamp_ms: u64) -> Self {
        Self::new(slot, digest, sender, timestamp_ms, MessageBody::Prepare)
    }

    /// Create a commit vote.
    pub fn commit(slot: Slot, digest: Hash, sender: ReplicaId, timestamp_ms: u64) -> Self {
        Self::new(slot, digest, sender, timestamp_ms, MessageBody::Commit)
    }

    /// Create a reply carrying the execution outcome.
    pub fn reply(
        slot: Slot,
        digest: Hash,
        sender: ReplicaId,
        timestamp_ms: u64,
        outcome: OperationResult,
    ) -> Self {
        Self::new(
            slot,
            digest,
            sender,
            timestamp_ms,
            MessageBody::Reply { outcome },
        )
    }

    /// Create a view-change announcement.
    ///
    /// The sequence is the highest one the sender has observed.
    pub fn view_change(
        new_view: ViewNumber,
        highest_sequence: SequenceNumber,
        sender: ReplicaId,
        timestamp_ms: u64,
    ) -> Self {
        Self::new(
            Slot::new(new_view, highest_sequence),
            Hash::ZERO,
            sender,
            timestamp_ms,
            MessageBody::ViewChange,
        )
    }

    /// Create a checkpoint announcement.
    pub fn checkpoint(snapshot: CheckpointSnapshot, sender: ReplicaId) -> Self {
        Self::new(
            Slot::new(snapshot.view, snapshot.sequence),
            Hash::ZERO,
            sender,
            snapshot.created_at_ms,
            MessageBody::Checkpoint { snapshot },
        )
    }

    fn new(
        slot: Slot,
        digest: Hash,
        sender: ReplicaId,
        timestamp_ms: u64,
        body: MessageBody,
    ) -> Self {
        Self {
            view: slot.view,
            sequence: slot.sequence,
            digest,
            sender,
            timestamp_ms,
            body,
        }
    }

    /// Phase of this message.
    pub fn phase(&self) -> Phase {
        match self.body {
            MessageBody::PrePrepare { .. } => Phase::PrePrepare,
            MessageBody::Prepare => Phase::Prepare,
            MessageBody::Commit => Phase::Commit,
            MessageBody::Reply { .. } => Phase::Reply,
            MessageBody::ViewChange => Phase::ViewChange,
            MessageBody::Checkpoint { .. } => Phase::Checkpoint,
        }
    }

    /// The (view, sequence) slot this message refers to.
    pub fn slot(&self) -> Slot {
        Slot::new(self.view, self.sequence)
    }
}
