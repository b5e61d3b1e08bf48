//! Ordering service contract and the in-memory stand-in.

use crate::{OrderingAck, RoutineEnvelope};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

/// Errors from the ordering service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutineError {
    /// The service refused the envelope.
    #[error("Ordering service rejected envelope: {0}")]
    Rejected(String),

    /// The service could not be reached.
    #[error("Ordering service unavailable: {0}")]
    Unavailable(String),
}

/// External ordering and replication service.
#[async_trait]
pub trait OrderingService: Send + Sync {
    /// Submit an envelope for ordering.
    async fn submit(&self, envelope: RoutineEnvelope) -> Result<OrderingAck, RoutineError>;
}

/// Append-only in-memory ordering.
///
/// Positions are assigned in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryOrderingService {
    log: Mutex<Vec<RoutineEnvelope>>,
}

impl InMemoryOrderingService {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes ordered so far.
    pub fn entries(&self) -> Vec<RoutineEnvelope> {
        self.log.lock().clone()
    }

    /// Number of envelopes ordered.
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Whether nothing has been ordered.
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

#[async_trait]
impl OrderingService for InMemoryOrderingService {
    async fn submit(&self, envelope: RoutineEnvelope) -> Result<OrderingAck, RoutineError> {
        let mut log = self.log.lock();
        let envelope_id = envelope.envelope_id;
        let acknowledged_at_ms = envelope.routed_at_ms;
        log.push(envelope);
        let position = log.len() as u64;
        debug!(
            envelope = %envelope_id.prefix(),
            position,
            "Envelope ordered"
        );
        Ok(OrderingAck {
            envelope_id,
            position,
            acknowledged_at_ms,
        })
    }
}
