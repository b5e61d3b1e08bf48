//! Classification outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction class assigned by a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionClass {
    /// Needs Byzantine fault tolerant agreement.
    Critical,
    /// Handed to the lightweight ordering path.
    Routine,
}

impl TransactionClass {
    /// Protocol that handles this class.
    pub fn protocol(self) -> Protocol {
        match self {
            TransactionClass::Critical => Protocol::Pbft,
            TransactionClass::Routine => Protocol::Routine,
        }
    }
}

impl fmt::Display for TransactionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionClass::Critical => f.write_str("CRITICAL"),
            TransactionClass::Routine => f.write_str("ROUTINE"),
        }
    }
}

/// Protocol a transaction is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// Four-phase agreement across all replicas.
    Pbft,
    /// External ordering service.
    Routine,
}

impl Protocol {
    /// All protocols, in reporting order.
    pub const ALL: [Protocol; 2] = [Protocol::Pbft, Protocol::Routine];
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Pbft => f.write_str("PBFT"),
            Protocol::Routine => f.write_str("ROUTINE"),
        }
    }
}

/// Security tier requested by, or assigned to, a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityTier {
    /// Ordinary handling.
    #[default]
    Standard,
    /// Enhanced handling.
    High,
}

impl SecurityTier {
    /// Stable tag used in request digests.
    pub(crate) fn tag(self) -> u8 {
        match self {
            SecurityTier::Standard => 0,
            SecurityTier::High => 1,
        }
    }
}

impl fmt::Display for SecurityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityTier::Standard => f.write_str("standard"),
            SecurityTier::High => f.write_str("high"),
        }
    }
}

/// Performance and security targets attached to a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolProfile {
    /// Expected throughput, in transactions per second.
    pub expected_tps: u32,
    /// Expected end-to-end latency, in milliseconds.
    pub expected_latency_ms: u64,
    /// Security tier of the protocol.
    pub security: SecurityTier,
}

impl ProtocolProfile {
    /// Targets for the agreement path.
    pub const fn critical() -> Self {
        Self {
            expected_tps: 500,
            expected_latency_ms: 2_000,
            security: SecurityTier::High,
        }
    }

    /// Targets for the ordering path.
    pub const fn routine() -> Self {
        Self {
            expected_tps: 1_000,
            expected_latency_ms: 1_000,
            security: SecurityTier::Standard,
        }
    }
}

/// Result of classifying a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDecision {
    /// Assigned class.
    pub class: TransactionClass,
    /// Protocol derived from the class.
    pub protocol: Protocol,
    /// Human-readable reason for the decision.
    pub rationale: String,
    /// Expected throughput target.
    pub expected_tps: u32,
    /// Expected latency target, in milliseconds.
    pub expected_latency_ms: u64,
    /// Security tier of the chosen protocol.
    pub security: SecurityTier,
}

impl ClassificationDecision {
    /// Build a decision from a class, a rationale and the class's profile.
    pub fn new(
        class: TransactionClass,
        rationale: impl Into<String>,
        profile: &ProtocolProfile,
    ) -> Self {
        Self {
            class,
            protocol: class.protocol(),
            rationale: rationale.into(),
            expected_tps: profile.expected_tps,
            expected_latency_ms: profile.expected_latency_ms,
            security: profile.security,
        }
    }

    /// Whether the decision routes to the agreement path.
    pub fn is_critical(&self) -> bool {
        self.class == TransactionClass::Critical
    }
}
