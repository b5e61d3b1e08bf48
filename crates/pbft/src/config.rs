//! PBFT configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the agreement state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PbftConfig {
    /// Sequence numbers between automatic checkpoints.
    ///
    /// Records with sequence at or below `checkpoint - interval` are discarded
    /// when a checkpoint is taken.
    pub checkpoint_interval: u64,

    /// Stall timeout for the optional view-change detector, in milliseconds.
    ///
    /// `None` disables the detector; view changes then only happen when
    /// explicitly requested.
    pub view_change_timeout_ms: Option<u64>,
}

impl Default for PbftConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 100,
            view_change_timeout_ms: None,
        }
    }
}

impl PbftConfig {
    /// Create a config with a custom checkpoint interval.
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Enable the stall detector.
    pub fn with_view_change_timeout(mut self, timeout: Duration) -> Self {
        self.view_change_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Stall timeout, if the detector is enabled.
    pub fn view_change_timeout(&self) -> Option<Duration> {
        self.view_change_timeout_ms.map(Duration::from_millis)
    }
}
