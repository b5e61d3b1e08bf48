//! Per-protocol performance accounting.
//!
//! The collector is an explicit context object: the router owns it behind an
//! `Arc` and hands out read-only [`MetricsSnapshot`]s. Counters reset only
//! when the process restarts.

use hybrid_types::Protocol;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    completions: u64,
    failures: u64,
    total_latency: Duration,
}

impl Counters {
    fn snapshot(&self) -> ProtocolSnapshot {
        let average_latency_ms = if self.completions > 0 {
            self.total_latency.as_secs_f64() * 1000.0 / self.completions as f64
        } else {
            0.0
        };
        let estimated_tps = if average_latency_ms > 0.0 {
            (1000.0 / average_latency_ms).round() as u64
        } else {
            0
        };
        ProtocolSnapshot {
            transactions: self.completions,
            failures: self.failures,
            average_latency_ms,
            estimated_tps,
        }
    }
}

/// Counters for one protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSnapshot {
    /// Successful transactions.
    pub transactions: u64,
    /// Failed transactions.
    pub failures: u64,
    /// Mean latency of successful transactions.
    pub average_latency_ms: f64,
    /// `1000 / average_latency_ms`, rounded; 0 when nothing completed.
    pub estimated_tps: u64,
}

/// Point-in-time view of all counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counters per protocol. Every protocol is present.
    pub protocols: BTreeMap<String, ProtocolSnapshot>,
    /// Successful transactions across protocols.
    pub total_transactions: u64,
    /// Failed transactions across protocols.
    pub total_failures: u64,
}

impl MetricsSnapshot {
    /// Counters for one protocol.
    pub fn protocol(&self, protocol: Protocol) -> Option<&ProtocolSnapshot> {
        self.protocols.get(&protocol.to_string())
    }
}

/// Per-protocol counters and cumulative latency.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<BTreeMap<Protocol, Counters>>,
}

impl MetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a successful transaction and its latency.
    pub fn record_completion(&self, protocol: Protocol, elapsed: Duration) {
        let mut counters = self.counters.write();
        let entry = counters.entry(protocol).or_default();
        entry.completions += 1;
        entry.total_latency += elapsed;
        trace!(protocol = %protocol, elapsed = ?elapsed, "Recorded completion");
    }

    /// Count a failed transaction.
    pub fn record_failure(&self, protocol: Protocol) {
        self.counters.write().entry(protocol).or_default().failures += 1;
        trace!(protocol = %protocol, "Recorded failure");
    }

    /// Current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.read();
        let mut snapshot = MetricsSnapshot::default();
        for protocol in Protocol::ALL {
            let entry = counters.get(&protocol).copied().unwrap_or_default();
            snapshot.total_transactions += entry.completions;
            snapshot.total_failures += entry.failures;
            snapshot
                .protocols
                .insert(protocol.to_string(), entry.snapshot());
        }
        snapshot
    }

    /// Successful transactions across protocols.
    pub fn total(&self) -> u64 {
        self.counters.read().values().map(|c| c.completions).sum()
    }
}
