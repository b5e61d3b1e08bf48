//! The router: classification, dispatch and result wrapping.

use crate::engine::{EngineHandle, EngineOutcome};
use crate::validation::{validate_critical, validate_routine};
use crate::{
    ConsensusReceipt, NetworkStatus, RouterConfig, RouterError, RouterResult, TransactionReceipt,
    ViewChangeOutcome,
};
use hybrid_classifier::{Classifier, RoutingRules};
use hybrid_core::{BusinessExecutor, ObservabilitySink, TracingSink};
use hybrid_metrics::{MetricsCollector, MetricsSnapshot};
use hybrid_pbft::{AdmissionClassifier, AdmissionRules, PbftConfig};
use hybrid_routine::{InMemoryOrderingService, OrderingService, RoutinePath};
use hybrid_simulation::{ClusterError, NetworkConfig, SimulatedCluster};
use hybrid_types::{
    ClassificationDecision, ConsensusMessage, Hash, MessageBody, Observation, Protocol,
    SequenceNumber, TransactionClass, TransactionRequest, ViewNumber,
};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Assembles a [`Router`] and spawns its engine actor.
pub struct RouterBuilder {
    config: RouterConfig,
    rules: RoutingRules,
    admission: AdmissionRules,
    pbft: PbftConfig,
    network: NetworkConfig,
    executor: Arc<dyn BusinessExecutor>,
    ordering: Arc<dyn OrderingService>,
    sink: Arc<dyn ObservabilitySink>,
    metrics: Arc<MetricsCollector>,
}

impl RouterBuilder {
    /// Defaults everywhere, with an in-memory ordering service.
    pub fn new(executor: Arc<dyn BusinessExecutor>) -> Self {
        Self {
            config: RouterConfig::default(),
            rules: RoutingRules::default(),
            admission: AdmissionRules::default(),
            pbft: PbftConfig::default(),
            network: NetworkConfig::default(),
            executor,
            ordering: Arc::new(InMemoryOrderingService::new()),
            sink: Arc::new(TracingSink),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Router settings.
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Classifier rules.
    pub fn with_rules(mut self, rules: RoutingRules) -> Self {
        self.rules = rules;
        self
    }

    /// Engine admission rules.
    pub fn with_admission(mut self, admission: AdmissionRules) -> Self {
        self.admission = admission;
        self
    }

    /// Agreement settings.
    pub fn with_pbft(mut self, pbft: PbftConfig) -> Self {
        self.pbft = pbft;
        self
    }

    /// Cluster shape.
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Ordering service for routine transactions.
    pub fn with_ordering(mut self, ordering: Arc<dyn OrderingService>) -> Self {
        self.ordering = ordering;
        self
    }

    /// Observability sink for phase and classification events.
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Shared metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Build the cluster and spawn the engine. Must run inside a tokio runtime.
    pub fn build(self) -> Result<Router, ClusterError> {
        let admission = AdmissionClassifier::new(self.admission);
        let cluster = SimulatedCluster::new(&self.network, self.pbft, admission.clone())?
            .with_sink(Arc::clone(&self.sink));
        let engine = EngineHandle::spawn(
            cluster,
            Arc::clone(&self.executor),
            self.config.view_change_tick(),
            self.config.command_queue,
        );

        Ok(Router {
            classifier: Classifier::new(self.rules),
            admission,
            routine: RoutinePath::new(self.ordering),
            engine,
            executor: self.executor,
            metrics: self.metrics,
            sink: self.sink,
            config: self.config,
        })
    }
}

/// Entry point for transactions.
///
/// Every call returns a [`RouterResult`]; failures below the router are
/// wrapped, never propagated.
pub struct Router {
    classifier: Classifier,
    admission: AdmissionClassifier,
    routine: RoutinePath,
    engine: EngineHandle,
    executor: Arc<dyn BusinessExecutor>,
    metrics: Arc<MetricsCollector>,
    sink: Arc<dyn ObservabilitySink>,
    config: RouterConfig,
}

impl Router {
    /// Start building a router around a business executor.
    pub fn builder(executor: Arc<dyn BusinessExecutor>) -> RouterBuilder {
        RouterBuilder::new(executor)
    }

    /// Settings in use.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Shared metrics collector.
    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Handle to the engine actor.
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Entry points
    // ═══════════════════════════════════════════════════════════════════════════

    /// Classify a request and record the decision.
    pub fn classify(&self, request: &TransactionRequest) -> ClassificationDecision {
        let (decision, event) = self.classifier.classify_observed(request, unix_millis());
        self.sink.record(&Observation::from(event));
        decision
    }

    /// Classify, then route.
    pub async fn submit(&self, request: TransactionRequest) -> RouterResult {
        let decision = self.classify(&request);
        self.route_transaction(request, &decision).await
    }

    /// Route an already-classified request.
    pub async fn route_transaction(
        &self,
        request: TransactionRequest,
        decision: &ClassificationDecision,
    ) -> RouterResult {
        let started = Instant::now();
        let protocol = decision.protocol;
        let outcome = match decision.class {
            TransactionClass::Critical => self.run_critical(request).await,
            TransactionClass::Routine => self.run_routine(&request).await,
        };
        self.finish(protocol, started, outcome)
    }

    /// Let the engine's admission classifier decide between agreement and the
    /// routine path.
    pub async fn submit_with_engine_admission(&self, request: TransactionRequest) -> RouterResult {
        let started = Instant::now();

        let expected = self.admission.classify(&request);
        let checked = if expected.is_critical() {
            validate_critical(&request, self.config.max_arguments)
        } else {
            validate_routine(&request, self.config.max_arguments)
        };
        if let Err(e) = checked {
            return self.finish(expected.protocol, started, Err(e.into()));
        }

        let digest = request.digest();
        let outcome = self
            .engine
            .submit_with_admission(request.clone(), self.config.consensus_timeout())
            .await;

        match outcome {
            Ok(EngineOutcome::Delegated { decision }) => {
                debug!(
                    operation = request.operation(),
                    rationale = %decision.rationale,
                    "Engine delegated request to routine path"
                );
                let outcome = self.run_routine(&request).await;
                self.finish(Protocol::Routine, started, outcome)
            }
            Ok(EngineOutcome::Executed {
                reply,
                current_view,
            }) => {
                let outcome = verify_reply(digest, &reply, current_view);
                self.finish(Protocol::Pbft, started, outcome)
            }
            Err(e) => self.finish(expected.protocol, started, Err(e)),
        }
    }

    /// Explicitly move the engine to the next view.
    pub async fn view_change(&self) -> Result<ViewChangeOutcome, RouterError> {
        let outcome = self.engine.view_change().await?;
        info!(
            view = outcome.view.0,
            primary = outcome.primary.0,
            "View change requested"
        );
        Ok(outcome)
    }

    /// Checkpoint the engine at its latest executed sequence.
    pub async fn checkpoint(&self) -> Result<SequenceNumber, RouterError> {
        self.engine.checkpoint().await
    }

    /// Engine state and fault tolerance.
    pub async fn network_status(&self) -> Result<NetworkStatus, RouterError> {
        self.engine.status().await
    }

    /// Per-protocol counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Paths
    // ═══════════════════════════════════════════════════════════════════════════

    async fn run_critical(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionReceipt, RouterError> {
        validate_critical(&request, self.config.max_arguments)?;
        let digest = request.digest();

        match self
            .engine
            .submit_critical(request, self.config.consensus_timeout())
            .await?
        {
            EngineOutcome::Executed {
                reply,
                current_view,
            } => verify_reply(digest, &reply, current_view),
            EngineOutcome::Delegated { .. } => Err(RouterError::IntegrityViolation(
                "critical request was delegated by the engine".to_string(),
            )),
        }
    }

    async fn run_routine(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionReceipt, RouterError> {
        validate_routine(request, self.config.max_arguments)?;
        let handle = self
            .routine
            .route_to_routine(request, unix_millis())
            .await?;
        let output = self
            .executor
            .execute(request.operation(), request.arguments())
            .await
            .map_err(|error| RouterError::Execution {
                error,
                receipt: None,
            })?;
        Ok(TransactionReceipt {
            output,
            consensus: None,
            ordering: Some(handle.ack),
        })
    }

    fn finish(
        &self,
        protocol: Protocol,
        started: Instant,
        outcome: Result<TransactionReceipt, RouterError>,
    ) -> RouterResult {
        let elapsed = started.elapsed();
        match &outcome {
            Ok(_) => self.metrics.record_completion(protocol, elapsed),
            Err(e) => {
                self.metrics.record_failure(protocol);
                warn!(
                    protocol = %protocol,
                    kind = e.kind(),
                    error = %e,
                    elapsed = ?elapsed,
                    "Transaction failed"
                );
            }
        }
        RouterResult {
            protocol,
            elapsed,
            outcome,
        }
    }
}

/// Post-commit checks on the REPLY, then unwrap the execution outcome.
fn verify_reply(
    digest: Hash,
    reply: &ConsensusMessage,
    current_view: ViewNumber,
) -> Result<TransactionReceipt, RouterError> {
    if reply.digest != digest {
        return Err(RouterError::IntegrityViolation(format!(
            "reply digest {} does not match request digest {}",
            reply.digest.prefix(),
            digest.prefix()
        )));
    }
    if reply.sequence == SequenceNumber::ZERO {
        return Err(RouterError::IntegrityViolation(
            "reply carries sequence 0".to_string(),
        ));
    }
    if reply.view > current_view {
        return Err(RouterError::IntegrityViolation(format!(
            "reply view {} is ahead of current view {}",
            reply.view, current_view
        )));
    }

    let receipt = ConsensusReceipt {
        view: reply.view,
        sequence: reply.sequence,
        digest,
    };
    match &reply.body {
        MessageBody::Reply { outcome } => match outcome {
            Ok(output) => Ok(TransactionReceipt {
                output: output.clone(),
                consensus: Some(receipt),
                ordering: None,
            }),
            Err(error) => Err(RouterError::Execution {
                error: error.clone(),
                receipt: Some(receipt),
            }),
        },
        _ => Err(RouterError::IntegrityViolation(format!(
            "expected REPLY, got {}",
            reply.phase()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_types::{DomainError, ReplicaId, Slot};
    use serde_json::json;

    fn slot(view: u64, sequence: u64) -> Slot {
        Slot::new(ViewNumber(view), SequenceNumber(sequence))
    }

    #[test]
    fn test_verify_reply_accepts_matching_reply() {
        let digest = Hash::from_bytes(b"req");
        let reply = ConsensusMessage::reply(slot(0, 1), digest, ReplicaId(0), 0, Ok(json!(7)));
        let receipt = verify_reply(digest, &reply, ViewNumber(0)).unwrap();
        assert_eq!(receipt.output, json!(7));
        assert_eq!(
            receipt.consensus.map(|r| r.sequence),
            Some(SequenceNumber(1))
        );
    }

    #[test]
    fn test_verify_reply_rejects_mismatches() {
        let digest = Hash::from_bytes(b"req");
        let other = Hash::from_bytes(b"other");

        let reply = ConsensusMessage::reply(slot(0, 1), other, ReplicaId(0), 0, Ok(json!(1)));
        assert!(matches!(
            verify_reply(digest, &reply, ViewNumber(0)),
            Err(RouterError::IntegrityViolation(_))
        ));

        let reply = ConsensusMessage::reply(slot(0, 0), digest, ReplicaId(0), 0, Ok(json!(1)));
        assert!(verify_reply(digest, &reply, ViewNumber(0)).is_err());

        let reply = ConsensusMessage::reply(slot(3, 1), digest, ReplicaId(0), 0, Ok(json!(1)));
        assert!(verify_reply(digest, &reply, ViewNumber(2)).is_err());

        let vote = ConsensusMessage::commit(slot(0, 1), digest, ReplicaId(0), 0);
        assert!(verify_reply(digest, &vote, ViewNumber(0)).is_err());
    }

    #[test]
    fn test_verify_reply_keeps_receipt_on_execution_failure() {
        let digest = Hash::from_bytes(b"req");
        let reply = ConsensusMessage::reply(
            slot(1, 4),
            digest,
            ReplicaId(1),
            0,
            Err(DomainError::failed("registerFarmer", "duplicate farmer")),
        );
        let err = verify_reply(digest, &reply, ViewNumber(1)).unwrap_err();
        assert_eq!(
            err.receipt(),
            Some(&ConsensusReceipt {
                view: ViewNumber(1),
                sequence: SequenceNumber(4),
                digest,
            })
        );
        assert_eq!(err.kind(), "EXECUTION");
    }
}
