//! Business-operation execution results.

use serde::{Deserialize, Serialize};

/// Failure reported by a business operation after consensus finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DomainError {
    /// The executor does not know the operation.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// The operation rejected its arguments.
    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments {
        /// Operation name.
        operation: String,
        /// Why the arguments were rejected.
        reason: String,
    },

    /// The operation failed while running.
    #[error("Operation {operation} failed: {reason}")]
    Failed {
        /// Operation name.
        operation: String,
        /// Failure description.
        reason: String,
    },
}

impl DomainError {
    /// Convenience constructor for a runtime failure.
    pub fn failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::Failed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of running a business operation.
pub type OperationResult = Result<serde_json::Value, DomainError>;
