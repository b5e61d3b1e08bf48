//! Hand-off of routine requests.

use crate::{OrderingAck, OrderingService, RoutineEnvelope, RoutineError};
use hybrid_types::TransactionRequest;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// What the routine path returns for an accepted request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutineHandle {
    /// The envelope submitted.
    pub envelope: RoutineEnvelope,
    /// The service's acknowledgement.
    pub ack: OrderingAck,
}

/// Routes routine requests to the ordering service.
pub struct RoutinePath {
    ordering: Arc<dyn OrderingService>,
    routed: AtomicU64,
}

impl RoutinePath {
    /// Create a path over an ordering service.
    pub fn new(ordering: Arc<dyn OrderingService>) -> Self {
        Self {
            ordering,
            routed: AtomicU64::new(0),
        }
    }

    /// Wrap a request and submit it for ordering.
    pub async fn route_to_routine(
        &self,
        request: &TransactionRequest,
        now_ms: u64,
    ) -> Result<RoutineHandle, RoutineError> {
        let envelope = RoutineEnvelope::from_request(request, now_ms);
        let routed = self.routed.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            operation = %envelope.operation,
            envelope = %envelope.envelope_id.prefix(),
            routed,
            "Routing to routine path"
        );

        match self.ordering.submit(envelope.clone()).await {
            Ok(ack) => Ok(RoutineHandle { envelope, ack }),
            Err(e) => {
                warn!(
                    operation = %envelope.operation,
                    envelope = %envelope.envelope_id.prefix(),
                    error = %e,
                    "Ordering service refused envelope"
                );
                Err(e)
            }
        }
    }

    /// Requests handed to the ordering service so far.
    pub fn routed_count(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }
}
