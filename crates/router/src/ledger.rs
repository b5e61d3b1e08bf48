//! Execution ledger.
//!
//! The engine actor consults the ledger before invoking the business
//! executor, so a digest is executed at most once even if it is ordered
//! again after its protocol records were garbage collected.

use hybrid_types::{Hash, OperationResult};
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Entry {
    Running,
    Done(OperationResult),
}

/// What to do with a committed digest.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// First time: invoke the executor.
    Execute,
    /// An invocation is already running.
    Running,
    /// Executed before; reuse the outcome.
    Cached(OperationResult),
}

/// Digest → execution state.
#[derive(Debug, Default)]
pub struct ExecutionLedger {
    entries: HashMap<Hash, Entry>,
}

impl ExecutionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `digest` should be executed, and mark it running if so.
    pub fn admit(&mut self, digest: Hash) -> Admission {
        match self.entries.get(&digest) {
            Some(Entry::Running) => Admission::Running,
            Some(Entry::Done(outcome)) => Admission::Cached(outcome.clone()),
            None => {
                self.entries.insert(digest, Entry::Running);
                Admission::Execute
            }
        }
    }

    /// Record the outcome of an invocation.
    pub fn finish(&mut self, digest: Hash, outcome: OperationResult) {
        self.entries.insert(digest, Entry::Done(outcome));
    }

    /// Outcome of a finished invocation.
    pub fn outcome(&self, digest: &Hash) -> Option<&OperationResult> {
        match self.entries.get(digest) {
            Some(Entry::Done(outcome)) => Some(outcome),
            _ => None,
        }
    }

    /// Finished invocations.
    pub fn executed(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, Entry::Done(_)))
            .count()
    }
}
