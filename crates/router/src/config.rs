//! Router configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the router and its engine actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// How long a critical submission waits for its REPLY.
    ///
    /// On expiry the caller gets `QuorumNotReached`; the request stays
    /// pending in the engine.
    pub consensus_timeout_ms: u64,

    /// Maximum number of arguments a request may carry.
    pub max_arguments: usize,

    /// Period of the stall-detector tick. `None` never ticks.
    ///
    /// Only useful together with `PbftConfig::view_change_timeout_ms`.
    pub view_change_tick_ms: Option<u64>,

    /// Capacity of the engine's command queue.
    pub command_queue: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            consensus_timeout_ms: 30_000,
            max_arguments: 32,
            view_change_tick_ms: None,
            command_queue: 1024,
        }
    }
}

impl RouterConfig {
    /// Set the REPLY wait deadline.
    pub fn with_consensus_timeout(mut self, timeout: Duration) -> Self {
        self.consensus_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the argument limit.
    pub fn with_max_arguments(mut self, max: usize) -> Self {
        self.max_arguments = max;
        self
    }

    /// Tick the stall detector every `period`.
    pub fn with_view_change_tick(mut self, period: Duration) -> Self {
        self.view_change_tick_ms = Some(period.as_millis() as u64);
        self
    }

    /// REPLY wait deadline.
    pub fn consensus_timeout(&self) -> Duration {
        Duration::from_millis(self.consensus_timeout_ms)
    }

    /// Stall-detector tick period.
    pub fn view_change_tick(&self) -> Option<Duration> {
        self.view_change_tick_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}
