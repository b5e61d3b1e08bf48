//! Requests between pre-prepare and execution.

use hybrid_types::{ClientId, Hash, TransactionRequest};
use std::collections::HashMap;

/// A request that has been pre-prepared but not executed.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// The original request.
    pub request: TransactionRequest,
    /// Who submitted it.
    pub submitter: ClientId,
    /// When this replica first saw it, in milliseconds.
    pub arrived_at_ms: u64,
}

impl PendingRequest {
    /// Track a request that arrived at `arrived_at_ms`.
    pub fn new(request: TransactionRequest, arrived_at_ms: u64) -> Self {
        let submitter = request.client().clone();
        Self {
            request,
            submitter,
            arrived_at_ms,
        }
    }
}

/// Pending requests keyed by digest.
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: HashMap<Hash, PendingRequest>,
}

impl PendingRequests {
    /// Track a request. An existing entry is left untouched.
    pub fn insert(&mut self, digest: Hash, pending: PendingRequest) {
        self.requests.entry(digest).or_insert(pending);
    }

    /// Stop tracking a request.
    pub fn remove(&mut self, digest: &Hash) -> Option<PendingRequest> {
        self.requests.remove(digest)
    }

    /// Look up a request.
    pub fn get(&self, digest: &Hash) -> Option<&PendingRequest> {
        self.requests.get(digest)
    }

    /// Whether a digest is pending.
    pub fn contains(&self, digest: &Hash) -> bool {
        self.requests.contains_key(digest)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Mean age of pending requests at `now_ms`, in milliseconds.
    pub fn average_age_ms(&self, now_ms: u64) -> f64 {
        if self.requests.is_empty() {
            return 0.0;
        }
        let total: u64 = self
            .requests
            .values()
            .map(|p| now_ms.saturating_sub(p.arrived_at_ms))
            .sum();
        total as f64 / self.requests.len() as f64
    }
}
