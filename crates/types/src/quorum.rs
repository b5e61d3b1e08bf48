//! Quorum arithmetic.
//!
//! With `n` replicas the protocol tolerates `f = floor((n - 1) / 3)` faulty
//! replicas and needs `2f + 1` matching messages per phase.
//!
//! Below four replicas `f` is zero and a single message forms a quorum: a
//! replica's own PREPARE and COMMIT are enough to make progress, and the
//! cluster offers no Byzantine fault tolerance at all.

use serde::{Deserialize, Serialize};

/// Maximum number of faulty replicas tolerated by `n` replicas.
pub fn max_faulty(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

/// Number of matching messages required for a phase quorum.
pub fn required_messages(n: usize) -> usize {
    max_faulty(n) * 2 + 1
}

/// Fault-tolerance summary for a replica set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaultTolerance {
    /// Total replicas.
    pub total: usize,
    /// Tolerated faulty replicas.
    pub max_faulty: usize,
    /// `max_faulty` as a percentage of `total`.
    pub percentage: f64,
}

impl FaultTolerance {
    /// Summarize `n` replicas.
    pub fn for_replicas(n: usize) -> Self {
        let f = max_faulty(n);
        let percentage = if n == 0 {
            0.0
        } else {
            f as f64 / n as f64 * 100.0
        };
        Self {
            total: n,
            max_faulty: f,
            percentage,
        }
    }
}
