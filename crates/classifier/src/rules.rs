//! Routing rule tables.

use hybrid_types::ProtocolProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Configurable routing rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingRules {
    /// Operations that always take the agreement path.
    pub critical: BTreeSet<String>,

    /// Operations that take the ordering path.
    pub routine: BTreeSet<String>,

    /// Values strictly above this escalate to the agreement path.
    pub value_threshold: f64,

    /// Whether a routine-listed operation carrying a value above the threshold
    /// escalates to CRITICAL.
    ///
    /// When false, list membership alone decides.
    pub escalate_routine_on_value: bool,

    /// Targets reported for critical decisions.
    pub critical_profile: ProtocolProfile,

    /// Targets reported for routine decisions.
    pub routine_profile: ProtocolProfile,
}

const DEFAULT_CRITICAL: &[&str] = &[
    "awardTeaBatch",
    "confirmDelivery",
    "deleteTeaBatch",
    "receiveByBuyer",
    "registerFarmer",
    "registerBuyer",
    "registerTransporter",
];

const DEFAULT_ROUTINE: &[&str] = &[
    "createTeaBatch",
    "placeBid",
    "queryAllTeaBatches",
    "queryAllTransporters",
    "query",
    "queryHistory",
    "shipToTransporter",
    "assignTransporter",
];

fn to_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            critical: to_set(DEFAULT_CRITICAL),
            routine: to_set(DEFAULT_ROUTINE),
            value_threshold: 1000.0,
            escalate_routine_on_value: true,
            critical_profile: ProtocolProfile::critical(),
            routine_profile: ProtocolProfile::routine(),
        }
    }
}

impl RoutingRules {
    /// Rules with empty lists: only the threshold and default apply.
    pub fn empty() -> Self {
        Self {
            critical: BTreeSet::new(),
            routine: BTreeSet::new(),
            ..Default::default()
        }
    }

    /// Replace the critical list.
    pub fn with_critical<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical = ops.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the routine list.
    pub fn with_routine<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routine = ops.into_iter().map(Into::into).collect();
        self
    }

    /// Set the value threshold.
    pub fn with_value_threshold(mut self, threshold: f64) -> Self {
        self.value_threshold = threshold;
        self
    }

    /// Enable or disable value escalation of routine operations.
    pub fn with_escalate_routine_on_value(mut self, escalate: bool) -> Self {
        self.escalate_routine_on_value = escalate;
        self
    }

    /// Whether an operation is on the critical list.
    pub fn is_critical(&self, operation: &str) -> bool {
        self.critical.contains(operation)
    }

    /// Whether an operation is on the routine list.
    pub fn is_routine(&self, operation: &str) -> bool {
        self.routine.contains(operation)
    }
}
