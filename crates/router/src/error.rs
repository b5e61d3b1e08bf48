//! Router errors.
//!
//! The router is the only place these become results; nothing below it
//! surfaces errors to clients.

use crate::{ConsensusReceipt, ValidationError};
use hybrid_core::RejectReason;
use hybrid_routine::RoutineError;
use hybrid_types::{DomainError, Hash, ViewNumber};
use std::time::Duration;

/// Why a transaction did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouterError {
    /// The request failed pre-dispatch checks.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No REPLY within the wait deadline. The request stays pending.
    #[error("Quorum not reached for {digest:?} within {waited:?}")]
    QuorumNotReached {
        /// Digest waited on.
        digest: Hash,
        /// How long the router waited.
        waited: Duration,
    },

    /// A view change dropped the request before execution.
    #[error("Request {digest:?} abandoned by view change from {view}")]
    Abandoned {
        /// Digest dropped.
        digest: Hash,
        /// View it was ordered in.
        view: ViewNumber,
    },

    /// The engine refused the submission.
    #[error("Engine rejected submission: {0}")]
    Rejected(#[from] RejectReason),

    /// The business operation failed after the transaction was ordered.
    ///
    /// Critical transactions carry their consensus receipt.
    #[error("Execution failed: {error}")]
    Execution {
        /// The domain failure.
        error: DomainError,
        /// Where the request committed, if it went through agreement.
        receipt: Option<ConsensusReceipt>,
    },

    /// The REPLY did not match the request.
    #[error("Integrity check failed: {0}")]
    IntegrityViolation(String),

    /// The ordering service refused a routine envelope.
    #[error("Ordering failed: {0}")]
    Ordering(#[from] RoutineError),

    /// The engine actor is gone.
    #[error("Consensus engine unavailable")]
    EngineUnavailable,
}

impl RouterError {
    /// Stable machine-readable name.
    pub fn kind(&self) -> &'static str {
        match self {
            RouterError::Validation(_) => "VALIDATION",
            RouterError::QuorumNotReached { .. } => "QUORUM_NOT_REACHED",
            RouterError::Abandoned { .. } => "ABANDONED",
            RouterError::Rejected(_) => "REJECTED",
            RouterError::Execution { .. } => "EXECUTION",
            RouterError::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
            RouterError::Ordering(_) => "ORDERING",
            RouterError::EngineUnavailable => "ENGINE_UNAVAILABLE",
        }
    }

    /// Consensus receipt of a post-commit execution failure.
    pub fn receipt(&self) -> Option<&ConsensusReceipt> {
        match self {
            RouterError::Execution { receipt, .. } => receipt.as_ref(),
            _ => None,
        }
    }
}
