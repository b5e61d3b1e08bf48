//! Recording business executor.

use async_trait::async_trait;
use hybrid_core::BusinessExecutor;
use hybrid_types::{Argument, DomainError, OperationResult};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;

/// Executor that records every call.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(String, Vec<Argument>)>>,
    failing: BTreeSet<String>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    /// Executor that succeeds for every operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail whenever `operation` is executed.
    pub fn failing_on(mut self, operation: impl Into<String>) -> Self {
        self.failing.insert(operation.into());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Calls for one operation.
    pub fn calls_for(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| op == operation)
            .count()
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<(String, Vec<Argument>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BusinessExecutor for RecordingExecutor {
    async fn execute(&self, operation: &str, arguments: &[Argument]) -> OperationResult {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls
            .lock()
            .push((operation.to_string(), arguments.to_vec()));

        if self.failing.contains(operation) {
            return Err(DomainError::failed(operation, "rejected by ledger"));
        }
        Ok(json!({ "operation": operation, "ok": true }))
    }
}
