//! The classifier itself.

use crate::RoutingRules;
use hybrid_types::{
    ClassificationDecision, ClassificationEvent, TransactionClass, TransactionRequest,
};
use std::time::Instant;
use tracing::debug;

/// Rationale for operations on the critical list.
pub const RATIONALE_CRITICAL_OPERATION: &str =
    "Critical operation requiring Byzantine fault tolerance";

/// Rationale for operations on the routine list.
pub const RATIONALE_ROUTINE_OPERATION: &str = "Routine operation optimized for performance";

/// Rationale for threshold escalation.
pub const RATIONALE_HIGH_VALUE: &str = "High-value transaction requiring enhanced security";

/// Rationale for the fallback rule.
pub const RATIONALE_DEFAULT: &str = "Default routing for standard operations";

/// Pure rule-based classifier.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: RoutingRules,
}

impl Classifier {
    /// Create a classifier over a rule set.
    pub fn new(rules: RoutingRules) -> Self {
        Self { rules }
    }

    /// The rules in use.
    pub fn rules(&self) -> &RoutingRules {
        &self.rules
    }

    /// Classify a request.
    pub fn classify(&self, request: &TransactionRequest) -> ClassificationDecision {
        self.classify_observed(request, 0).0
    }

    /// Classify a request and produce the matching observability record.
    pub fn classify_observed(
        &self,
        request: &TransactionRequest,
        now_ms: u64,
    ) -> (ClassificationDecision, ClassificationEvent) {
        let started = Instant::now();
        let (class, rationale) = self.evaluate(request);
        let profile = match class {
            TransactionClass::Critical => &self.rules.critical_profile,
            TransactionClass::Routine => &self.rules.routine_profile,
        };
        let decision = ClassificationDecision::new(class, rationale, profile);
        let elapsed_us = started.elapsed().as_micros() as u64;

        debug!(
            operation = request.operation(),
            class = %class,
            rationale,
            elapsed_us,
            "Classified transaction"
        );

        let event = ClassificationEvent {
            operation: request.operation().to_string(),
            class,
            rationale: rationale.to_string(),
            elapsed_us,
            timestamp_ms: now_ms,
        };
        (decision, event)
    }

    fn evaluate(&self, request: &TransactionRequest) -> (TransactionClass, &'static str) {
        let operation = request.operation();
        let exceeds_threshold = request
            .max_numeric()
            .is_some_and(|v| v > self.rules.value_threshold);

        if self.rules.is_critical(operation) {
            return (TransactionClass::Critical, RATIONALE_CRITICAL_OPERATION);
        }

        if self.rules.is_routine(operation)
            && !(self.rules.escalate_routine_on_value && exceeds_threshold)
        {
            return (TransactionClass::Routine, RATIONALE_ROUTINE_OPERATION);
        }

        if exceeds_threshold {
            return (TransactionClass::Critical, RATIONALE_HIGH_VALUE);
        }

        (TransactionClass::Routine, RATIONALE_DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_types::{Argument, Protocol, SecurityTier};
    use tracing_test::traced_test;

    fn request(op: &str, args: Vec<Argument>) -> TransactionRequest {
        TransactionRequest::new(op, args)
    }

    #[test]
    fn test_critical_list_ignores_arguments() {
        let classifier = Classifier::default();
        for op in classifier.rules().critical.clone() {
            for args in [
                vec![],
                vec![Argument::number(1.0)],
                vec![Argument::number(1_000_000.0)],
                vec![Argument::text("x")],
            ] {
                let decision = classifier.classify(&request(&op, args));
                assert_eq!(decision.class, TransactionClass::Critical, "{op}");
                assert_eq!(decision.rationale, RATIONALE_CRITICAL_OPERATION);
                assert_eq!(decision.protocol, Protocol::Pbft);
                assert_eq!(decision.security, SecurityTier::High);
            }
        }
    }

    #[test]
    fn test_routine_list_escalates_on_large_argument() {
        let classifier = Classifier::default();
        for op in classifier.rules().routine.clone() {
            let small = classifier.classify(&request(&op, vec!["B1".into(), "999".into()]));
            assert_eq!(small.class, TransactionClass::Routine, "{op}");
            assert_eq!(small.rationale, RATIONALE_ROUTINE_OPERATION);
            assert_eq!(small.expected_tps, 1000);

            let large = classifier.classify(&request(&op, vec!["B1".into(), "1001".into()]));
            assert_eq!(large.class, TransactionClass::Critical, "{op}");
            assert_eq!(large.rationale, RATIONALE_HIGH_VALUE);
        }
    }

    #[test]
    fn test_strict_precedence_when_escalation_disabled() {
        let classifier =
            Classifier::new(RoutingRules::default().with_escalate_routine_on_value(false));
        let decision =
            classifier.classify(&request("placeBid", vec!["B1".into(), Argument::number(5000.0)]));
        assert_eq!(decision.class, TransactionClass::Routine);
    }

    #[test]
    fn test_unknown_operation_threshold() {
        let classifier = Classifier::default();

        let high = classifier.classify(&request("transferFunds", vec![Argument::number(5000.0)]));
        assert_eq!(high.class, TransactionClass::Critical);
        assert_eq!(high.rationale, RATIONALE_HIGH_VALUE);
        assert_eq!(high.expected_latency_ms, 2000);

        let at_threshold =
            classifier.classify(&request("transferFunds", vec![Argument::number(1000.0)]));
        assert_eq!(at_threshold.class, TransactionClass::Routine);
        assert_eq!(at_threshold.rationale, RATIONALE_DEFAULT);

        let valued = classifier.classify(&request("transferFunds", vec![]).with_value(1500.0));
        assert_eq!(valued.class, TransactionClass::Critical);
    }

    #[test]
    fn test_custom_rules_are_swappable() {
        let classifier = Classifier::new(
            RoutingRules::empty()
                .with_critical(["mint"])
                .with_value_threshold(10.0),
        );
        assert!(classifier.classify(&request("mint", vec![])).is_critical());
        assert!(!classifier
            .classify(&request("registerFarmer", vec![]))
            .is_critical());
        assert!(classifier
            .classify(&request("anything", vec!["11".into()]))
            .is_critical());
    }

    #[traced_test]
    #[test]
    fn test_observed_classification_logs_rationale() {
        let classifier = Classifier::default();
        let (decision, event) = classifier.classify_observed(
            &request("registerFarmer", vec!["F1".into(), "Alice".into(), "Valley".into()]),
            42,
        );
        assert_eq!(event.class, decision.class);
        assert_eq!(event.operation, "registerFarmer");
        assert_eq!(event.timestamp_ms, 42);
        assert!(logs_contain("Classified transaction"));
    }
}
