//! Admission classifier.
//!
//! Requests that reach the engine without upstream classification are
//! classified here with the engine's own table, which differs from the
//! router's on purpose: asset creation and logistics transfers are critical
//! at the contract level.

use hybrid_types::{
    Argument, ClassificationDecision, ProtocolProfile, TransactionClass, TransactionRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Admission rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionRules {
    /// Contract functions that always need agreement.
    pub critical_operations: BTreeSet<String>,

    /// Any argument whose leading number is above this is high value.
    pub amount_threshold: f64,

    /// Arguments carrying `quantity_unit` with a leading integer above this
    /// are large batches.
    pub quantity_threshold: i64,

    /// Unit marker identifying quantity arguments.
    pub quantity_unit: String,
}

impl Default for AdmissionRules {
    fn default() -> Self {
        Self {
            critical_operations: ["receiveByBuyer", "createTeaBatch", "shipToTransporter"]
                .into_iter()
                .map(String::from)
                .collect(),
            amount_threshold: 1000.0,
            quantity_threshold: 100,
            quantity_unit: "kg".to_string(),
        }
    }
}

impl AdmissionRules {
    /// Replace the critical function list.
    pub fn with_critical_operations<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_operations = ops.into_iter().map(Into::into).collect();
        self
    }

    /// Set the amount threshold.
    pub fn with_amount_threshold(mut self, threshold: f64) -> Self {
        self.amount_threshold = threshold;
        self
    }

    /// Set the quantity threshold.
    pub fn with_quantity_threshold(mut self, threshold: i64) -> Self {
        self.quantity_threshold = threshold;
        self
    }
}

/// Classifier applied at engine admission.
#[derive(Debug, Clone, Default)]
pub struct AdmissionClassifier {
    rules: AdmissionRules,
}

impl AdmissionClassifier {
    /// Create an admission classifier.
    pub fn new(rules: AdmissionRules) -> Self {
        Self { rules }
    }

    /// The rules in use.
    pub fn rules(&self) -> &AdmissionRules {
        &self.rules
    }

    /// Classify a request. Never fails.
    pub fn classify(&self, request: &TransactionRequest) -> ClassificationDecision {
        let (class, rationale) = self.evaluate(request);
        debug!(
            operation = request.operation(),
            class = %class,
            rationale,
            "Admission classification"
        );
        let profile = match class {
            TransactionClass::Critical => ProtocolProfile::critical(),
            TransactionClass::Routine => ProtocolProfile::routine(),
        };
        ClassificationDecision::new(class, rationale, &profile)
    }

    fn evaluate(&self, request: &TransactionRequest) -> (TransactionClass, &'static str) {
        if self.rules.critical_operations.contains(request.operation()) {
            return (TransactionClass::Critical, "Critical contract function");
        }

        let args = request.arguments();
        if args.iter().any(|arg| self.is_high_amount(arg)) {
            return (TransactionClass::Critical, "Argument above amount threshold");
        }
        if args.iter().any(|arg| self.is_large_quantity(arg)) {
            return (TransactionClass::Critical, "Quantity above batch threshold");
        }

        (TransactionClass::Routine, "Regular transaction")
    }

    fn is_high_amount(&self, arg: &Argument) -> bool {
        arg.leading_float()
            .is_some_and(|amount| amount > self.rules.amount_threshold)
    }

    fn is_large_quantity(&self, arg: &Argument) -> bool {
        let Some(text) = arg.as_text() else {
            return false;
        };
        text.contains(self.rules.quantity_unit.as_str())
            && arg
                .leading_int()
                .is_some_and(|qty| qty > self.rules.quantity_threshold)
    }
}
