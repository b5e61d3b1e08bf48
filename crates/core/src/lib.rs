//! Core contracts for hybrid consensus.
//!
//! State machines consume [`Event`]s and return [`Action`]s. They never
//! perform I/O: the runner delivers messages through a [`Transport`], invokes
//! the [`BusinessExecutor`], and forwards observations to an
//! [`ObservabilitySink`].

mod executor;
mod message;
mod observability;
mod traits;

pub use executor::{AcknowledgingExecutor, BusinessExecutor};
pub use message::Envelope;
pub use observability::{MemorySink, ObservabilitySink, TracingSink};
pub use traits::{StateMachine, Transport};

use hybrid_types::{
    ClassificationDecision, ConsensusMessage, Hash, Observation, OperationResult, ReplicaId,
    SequenceNumber, Slot, TransactionRequest, ViewNumber,
};

/// Inputs to a replica state machine.
#[derive(Debug, Clone)]
pub enum Event {
    /// Request that has not been classified upstream. Passes admission first.
    SubmitRequest {
        /// The client request.
        request: TransactionRequest,
    },

    /// Request already classified as critical upstream. Skips admission.
    SubmitCritical {
        /// The client request.
        request: TransactionRequest,
    },

    /// Message delivered from a peer (or from ourselves).
    MessageReceived {
        /// Transport-level sender.
        from: ReplicaId,
        /// The message.
        message: ConsensusMessage,
    },

    /// The runner finished executing a committed request.
    ExecutionCompleted {
        /// Digest that was executed.
        digest: Hash,
        /// Outcome of the business operation.
        outcome: OperationResult,
    },

    /// Explicitly invoked view change.
    ViewChangeRequested,

    /// Periodic tick for the stall detector.
    ViewChangeTimer,

    /// Explicitly requested checkpoint at the latest executed sequence.
    CheckpointRequested,
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::SubmitRequest { .. } => "SubmitRequest",
            Event::SubmitCritical { .. } => "SubmitCritical",
            Event::MessageReceived { .. } => "MessageReceived",
            Event::ExecutionCompleted { .. } => "ExecutionCompleted",
            Event::ViewChangeRequested => "ViewChangeRequested",
            Event::ViewChangeTimer => "ViewChangeTimer",
            Event::CheckpointRequested => "CheckpointRequested",
        }
    }
}

/// Why a submission was refused before entering the protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// Only the primary may assign sequence numbers.
    #[error("Not the primary; current primary is {primary}")]
    NotPrimary {
        /// Current primary.
        primary: ReplicaId,
    },

    /// The digest is already bound to a slot in this view.
    #[error("Request already in progress at sequence {sequence}")]
    InProgress {
        /// Sequence the digest is bound to.
        sequence: SequenceNumber,
    },
}

/// Outputs of a replica state machine.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send a message to every replica, including the sender.
    Broadcast {
        /// The message.
        message: ConsensusMessage,
    },

    /// Run the business operation for a committed request.
    ///
    /// Emitted at most once per digest.
    Execute {
        /// Digest to execute.
        digest: Hash,
        /// Slot the digest committed in.
        slot: Slot,
        /// The request.
        request: TransactionRequest,
    },

    /// Hand a reply to whoever waits on the digest.
    EmitReply {
        /// Digest replied to.
        digest: Hash,
        /// The REPLY message.
        message: ConsensusMessage,
    },

    /// Admission classified the request as routine.
    DelegateToRoutine {
        /// Digest of the request.
        digest: Hash,
        /// The request.
        request: TransactionRequest,
        /// Admission decision.
        decision: ClassificationDecision,
    },

    /// A view change or checkpoint dropped a request before execution.
    RequestAbandoned {
        /// Digest dropped.
        digest: Hash,
        /// View the request was ordered in.
        view: ViewNumber,
    },

    /// A submission was refused.
    RequestRejected {
        /// Digest refused.
        digest: Hash,
        /// Why.
        reason: RejectReason,
    },

    /// Structured observability record.
    Observe(Observation),
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::Execute { .. } => "Execute",
            Action::EmitReply { .. } => "EmitReply",
            Action::DelegateToRoutine { .. } => "DelegateToRoutine",
            Action::RequestAbandoned { .. } => "RequestAbandoned",
            Action::RequestRejected { .. } => "RequestRejected",
            Action::Observe(_) => "Observe",
        }
    }
}
