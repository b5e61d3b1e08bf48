//! Core types for hybrid transaction consensus.
//!
//! This crate provides the data shared by every other crate:
//!
//! - Requests, arguments and their canonical digest
//! - Classification outcomes and protocol profiles
//! - Agreement protocol messages and per-digest status
//! - Quorum arithmetic and replica membership
//! - Observability records

mod argument;
mod classification;
mod consensus;
mod execution;
mod hash;
mod identifiers;
mod observation;
pub mod quorum;
mod replica_set;
mod request;

pub use argument::Argument;
pub use classification::{
    ClassificationDecision, Protocol, ProtocolProfile, SecurityTier, TransactionClass,
};
pub use consensus::{CheckpointSnapshot, ConsensusMessage, MessageBody, Phase, RequestStatus};
pub use execution::{DomainError, OperationResult};
pub use hash::{Hash, HexError};
pub use identifiers::{ClientId, ReplicaId, SequenceNumber, Slot, ViewNumber};
pub use observation::{ClassificationEvent, Observation, PhaseEvent};
pub use quorum::{max_faulty, required_messages, FaultTolerance};
pub use replica_set::{ReplicaSetError, ReplicaSetView};
pub use request::TransactionRequest;
