//! Results returned to clients.

use crate::RouterError;
use hybrid_routine::OrderingAck;
use hybrid_types::{
    FaultTolerance, Hash, Protocol, ReplicaId, SequenceNumber, ViewNumber,
};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;

/// Where a critical transaction committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsensusReceipt {
    /// View of the REPLY.
    pub view: ViewNumber,
    /// Sequence of the REPLY.
    pub sequence: SequenceNumber,
    /// Request digest.
    pub digest: Hash,
}

/// Successful outcome of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionReceipt {
    /// Executor output.
    pub output: Value,
    /// Agreement receipt, for critical transactions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusReceipt>,
    /// Ordering acknowledgement, for routine transactions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<OrderingAck>,
}

/// Outcome of routing one transaction. Never an error at the call site.
#[derive(Debug, Clone)]
pub struct RouterResult {
    /// Protocol the transaction went through.
    pub protocol: Protocol,
    /// Time spent in the router.
    pub elapsed: Duration,
    /// Receipt or failure.
    pub outcome: Result<TransactionReceipt, RouterError>,
}

impl RouterResult {
    /// Whether the transaction succeeded.
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The receipt, if successful.
    pub fn receipt(&self) -> Option<&TransactionReceipt> {
        self.outcome.as_ref().ok()
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&RouterError> {
        self.outcome.as_ref().err()
    }
}

#[derive(Serialize)]
struct ErrorView<'a> {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    receipt: Option<&'a ConsensusReceipt>,
}

#[derive(Serialize)]
struct ResultView<'a> {
    success: bool,
    protocol: Protocol,
    elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a TransactionReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorView<'a>>,
}

impl Serialize for RouterResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResultView {
            success: self.success(),
            protocol: self.protocol,
            elapsed_ms: self.elapsed.as_secs_f64() * 1000.0,
            result: self.receipt(),
            error: self.error().map(|e| ErrorView {
                kind: e.kind(),
                message: e.to_string(),
                receipt: e.receipt(),
            }),
        }
        .serialize(serializer)
    }
}

/// Engine state as seen by the local replica.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStatus {
    /// Number of replicas.
    pub replicas: usize,
    /// The local replica.
    pub local: ReplicaId,
    /// Current primary.
    pub primary: ReplicaId,
    /// Current view.
    pub view: ViewNumber,
    /// Highest sequence assigned or observed.
    pub highest_sequence: SequenceNumber,
    /// Latest checkpoint.
    pub last_checkpoint: SequenceNumber,
    /// Latest executed sequence.
    pub last_executed: SequenceNumber,
    /// Requests pre-prepared or prepared, not yet committed.
    pub in_flight: usize,
    /// View changes applied.
    pub view_changes: u64,
    /// Fault-tolerance summary.
    pub fault_tolerance: FaultTolerance,
}

/// Where an explicit view change landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewChangeOutcome {
    /// The new view.
    pub view: ViewNumber,
    /// Its primary.
    pub primary: ReplicaId,
}
