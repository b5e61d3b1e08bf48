//! PBFT agreement state machine.
//!
//! This crate provides a synchronous PBFT replica that is driven by the
//! runner through [`hybrid_core::Event`]s:
//!
//! - `Event::SubmitRequest` → Admission classification, then pre-prepare or delegate
//! - `Event::SubmitCritical` → Primary assigns a sequence and pre-prepares
//! - `Event::MessageReceived` → Validate, collect PREPARE/COMMIT quorums
//! - `Event::ExecutionCompleted` → Reply, checkpoint every `checkpoint_interval`
//! - `Event::ViewChangeRequested` → Move to the next view and announce it
//! - `Event::ViewChangeTimer` → Stall detector, if configured
//!
//! All I/O is performed by the runner via returned `Action`s.

mod admission;
mod checkpoint;
mod config;
mod pending;
mod quorum_set;
mod state;
mod view_change;
mod violation;

pub use admission::{AdmissionClassifier, AdmissionRules};
pub use checkpoint::CheckpointStore;
pub use config::PbftConfig;
pub use pending::{PendingRequest, PendingRequests};
pub use quorum_set::{QuorumSet, VoteRecord};
pub use state::PbftState;
pub use view_change::ViewChangeState;
pub use violation::ProtocolViolation;
