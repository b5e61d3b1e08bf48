//! Protocol violations.
//!
//! Violating messages are rejected and logged. They never change state and
//! are never surfaced to clients.

use hybrid_types::{Hash, ReplicaId, SequenceNumber, Slot, ViewNumber};

/// Why an inbound message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// Message from a view other than the current one.
    #[error("Message for {message_view} but current view is {current_view}")]
    StaleView {
        /// View carried by the message.
        message_view: ViewNumber,
        /// Receiver's view.
        current_view: ViewNumber,
    },

    /// Sequence at or below the last checkpoint.
    #[error("Sequence {sequence} is not above last checkpoint {last_checkpoint}")]
    StaleSequence {
        /// Sequence carried by the message.
        sequence: SequenceNumber,
        /// Receiver's last checkpoint.
        last_checkpoint: SequenceNumber,
    },

    /// Pre-prepare from a replica that is not the primary.
    #[error("Pre-prepare from {sender} but primary is {primary}")]
    NotPrimary {
        /// Sender of the pre-prepare.
        sender: ReplicaId,
        /// Primary of the message's view.
        primary: ReplicaId,
    },

    /// Pre-prepare digest does not match its request.
    #[error("Digest {claimed:?} does not match request digest {computed:?}")]
    DigestMismatch {
        /// Digest in the message.
        claimed: Hash,
        /// Digest of the carried request.
        computed: Hash,
    },

    /// A second, different digest for an already-bound slot.
    #[error("Slot {slot} already bound to {bound:?}, received {received:?}")]
    Equivocation {
        /// The contested slot.
        slot: Slot,
        /// Digest already bound.
        bound: Hash,
        /// Conflicting digest.
        received: Hash,
    },

    /// The digest is already bound to another slot.
    #[error("Digest {digest:?} already bound to slot {existing}")]
    Rebinding {
        /// The digest.
        digest: Hash,
        /// Slot it is bound to.
        existing: Slot,
    },

    /// Sender is not a replica.
    #[error("Unknown sender {0}")]
    UnknownSender(ReplicaId),

    /// Claimed sender differs from the transport sender.
    #[error("Message claims sender {claimed} but arrived from {from}")]
    SenderMismatch {
        /// Transport-level sender.
        from: ReplicaId,
        /// Sender field of the message.
        claimed: ReplicaId,
    },
}

impl ProtocolViolation {
    /// Stale messages are expected around view changes and checkpoints.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            ProtocolViolation::StaleView { .. } | ProtocolViolation::StaleSequence { .. }
        )
    }
}
