//! Structured observability records.

use crate::{Hash, Phase, ReplicaId, SequenceNumber, TransactionClass, ViewNumber};
use serde::{Deserialize, Serialize};

/// A replica moved a digest through a protocol phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEvent {
    /// Phase entered or message emitted.
    pub phase: Phase,
    /// Replica that made the transition.
    pub replica: ReplicaId,
    /// View at the time.
    pub view: ViewNumber,
    /// Sequence involved.
    pub sequence: SequenceNumber,
    /// Short digest prefix.
    pub digest_prefix: String,
    /// Event time in milliseconds.
    pub timestamp_ms: u64,
}

impl PhaseEvent {
    /// Create a phase event for a digest.
    pub fn new(
        phase: Phase,
        replica: ReplicaId,
        view: ViewNumber,
        sequence: SequenceNumber,
        digest: &Hash,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            phase,
            replica,
            view,
            sequence,
            digest_prefix: digest.prefix(),
            timestamp_ms,
        }
    }
}

/// A classifier produced a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEvent {
    /// Operation classified.
    pub operation: String,
    /// Assigned class.
    pub class: TransactionClass,
    /// Reason for the decision.
    pub rationale: String,
    /// Time spent classifying, in microseconds.
    pub elapsed_us: u64,
    /// Event time in milliseconds.
    pub timestamp_ms: u64,
}

/// Any observability record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// Protocol phase transition.
    Phase(PhaseEvent),
    /// Classification decision.
    Classification(ClassificationEvent),
}

impl From<PhaseEvent> for Observation {
    fn from(event: PhaseEvent) -> Self {
        Observation::Phase(event)
    }
}

impl From<ClassificationEvent> for Observation {
    fn from(event: ClassificationEvent) -> Self {
        Observation::Classification(event)
    }
}
