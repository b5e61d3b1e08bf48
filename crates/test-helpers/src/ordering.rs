//! Ordering service that refuses everything.

use async_trait::async_trait;
use hybrid_routine::{OrderingAck, OrderingService, RoutineEnvelope, RoutineError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Refuses every envelope with [`RoutineError::Rejected`].
#[derive(Debug, Default)]
pub struct FailingOrderingService {
    attempts: AtomicUsize,
}

impl FailingOrderingService {
    /// Create the service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes refused so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OrderingService for FailingOrderingService {
    async fn submit(&self, envelope: RoutineEnvelope) -> Result<OrderingAck, RoutineError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(RoutineError::Rejected(format!(
            "{} not accepted",
            envelope.operation
        )))
    }
}
