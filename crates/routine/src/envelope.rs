//! Envelope and acknowledgement types.

use hybrid_types::{Argument, ClientId, Hash, TransactionRequest};
use serde::{Deserialize, Serialize};

/// A routine request prepared for the ordering service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineEnvelope {
    /// Envelope id (the request digest).
    pub envelope_id: Hash,
    /// Operation name.
    pub operation: String,
    /// Operation arguments.
    pub arguments: Vec<Argument>,
    /// Submitting client.
    pub client: ClientId,
    /// When the client submitted the request, in milliseconds.
    pub submitted_at_ms: u64,
    /// When the router handed it to the routine path, in milliseconds.
    pub routed_at_ms: u64,
}

impl RoutineEnvelope {
    /// Wrap a request.
    pub fn from_request(request: &TransactionRequest, routed_at_ms: u64) -> Self {
        Self {
            envelope_id: request.digest(),
            operation: request.operation().to_string(),
            arguments: request.arguments().to_vec(),
            client: request.client().clone(),
            submitted_at_ms: request.submitted_at_ms(),
            routed_at_ms,
        }
    }
}

/// Acknowledgement returned by the ordering service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingAck {
    /// Envelope acknowledged.
    pub envelope_id: Hash,
    /// Position assigned by the service, starting at 1.
    pub position: u64,
    /// Acknowledgement time in milliseconds.
    pub acknowledged_at_ms: u64,
}
