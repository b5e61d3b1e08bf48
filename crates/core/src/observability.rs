//! Observability sinks for phase and classification events.

use hybrid_types::{ClassificationEvent, Observation, PhaseEvent};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Receives structured observability records.
pub trait ObservabilitySink: Send + Sync {
    /// Record one observation.
    fn record(&self, observation: &Observation);
}

/// Forwards observations to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, observation: &Observation) {
        match observation {
            Observation::Phase(event) => debug!(
                phase = %event.phase,
                replica = event.replica.0,
                view = event.view.0,
                sequence = event.sequence.0,
                digest = %event.digest_prefix,
                timestamp_ms = event.timestamp_ms,
                "Phase transition"
            ),
            Observation::Classification(event) => info!(
                operation = %event.operation,
                class = %event.class,
                rationale = %event.rationale,
                elapsed_us = event.elapsed_us,
                "Transaction classified"
            ),
        }
    }
}

/// Keeps every observation in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Observation>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All observations so far.
    pub fn events(&self) -> Vec<Observation> {
        self.events.lock().clone()
    }

    /// Phase events so far.
    pub fn phase_events(&self) -> Vec<PhaseEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|o| match o {
                Observation::Phase(e) => Some(e.clone()),
                Observation::Classification(_) => None,
            })
            .collect()
    }

    /// Classification events so far.
    pub fn classification_events(&self) -> Vec<ClassificationEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|o| match o {
                Observation::Classification(e) => Some(e.clone()),
                Observation::Phase(_) => None,
            })
            .collect()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ObservabilitySink for MemorySink {
    fn record(&self, observation: &Observation) {
        self.events.lock().push(observation.clone());
    }
}
