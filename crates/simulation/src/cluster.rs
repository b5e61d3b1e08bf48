//! Replica cluster driven through the local transport.

use crate::{LocalTransport, NetworkConfig};
use hybrid_core::{
    Action, Envelope, Event, ObservabilitySink, RejectReason, StateMachine, TracingSink, Transport,
};
use hybrid_pbft::{AdmissionClassifier, PbftConfig, PbftState};
use hybrid_types::{
    ClassificationDecision, ConsensusMessage, FaultTolerance, Hash, OperationResult, ReplicaId,
    ReplicaSetError, ReplicaSetView, SequenceNumber, Slot, TransactionRequest, ViewNumber,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Errors building or addressing the cluster.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    /// Invalid membership.
    #[error("Invalid replica set: {0}")]
    ReplicaSet(#[from] ReplicaSetError),

    /// No replica with this id.
    #[error("Unknown replica {0}")]
    UnknownReplica(ReplicaId),
}

/// Actions that leave the cluster.
#[derive(Debug, Clone)]
pub enum ClusterOutput {
    /// A replica committed a request and wants it executed.
    Execute {
        /// Replica that committed.
        replica: ReplicaId,
        /// Digest to execute.
        digest: Hash,
        /// Slot it committed in.
        slot: Slot,
        /// The request.
        request: TransactionRequest,
    },

    /// A replica produced a REPLY.
    Reply {
        /// Replica that replied.
        replica: ReplicaId,
        /// Digest replied to.
        digest: Hash,
        /// The REPLY message.
        message: ConsensusMessage,
    },

    /// Admission handed the request back to the routine path.
    Delegated {
        /// Digest of the request.
        digest: Hash,
        /// The request.
        request: TransactionRequest,
        /// Admission decision.
        decision: ClassificationDecision,
    },

    /// A replica dropped a request before execution.
    Abandoned {
        /// Replica that dropped it.
        replica: ReplicaId,
        /// Digest dropped.
        digest: Hash,
        /// View it was ordered in.
        view: ViewNumber,
    },

    /// A replica refused a submission.
    Rejected {
        /// Replica that refused.
        replica: ReplicaId,
        /// Digest refused.
        digest: Hash,
        /// Why.
        reason: RejectReason,
    },
}

impl ClusterOutput {
    /// Get a human-readable name for this output type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClusterOutput::Execute { .. } => "Execute",
            ClusterOutput::Reply { .. } => "Reply",
            ClusterOutput::Delegated { .. } => "Delegated",
            ClusterOutput::Abandoned { .. } => "Abandoned",
            ClusterOutput::Rejected { .. } => "Rejected",
        }
    }
}

/// Counters for the cluster run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    /// Events handed to replicas.
    pub events_processed: u64,
    /// Envelopes sent.
    pub messages_sent: u64,
    /// Envelopes delivered.
    pub messages_delivered: u64,
}

/// All replicas of one agreement group in a single process.
pub struct SimulatedCluster {
    replicas: Vec<PbftState>,
    transport: LocalTransport,
    local: ReplicaId,
    sink: Arc<dyn ObservabilitySink>,
    stats: SimulationStats,
    now: Duration,
}

impl SimulatedCluster {
    /// Build a cluster of `network.replicas` replicas with ids `0..n`.
    pub fn new(
        network: &NetworkConfig,
        pbft: PbftConfig,
        admission: AdmissionClassifier,
    ) -> Result<Self, ClusterError> {
        let local = ReplicaId(network.local_replica);
        let replicas = (0..network.replicas as u64)
            .map(|id| {
                let view = ReplicaSetView::with_count(network.replicas, ReplicaId(id))?;
                Ok(PbftState::new(view, pbft.clone(), admission.clone()))
            })
            .collect::<Result<Vec<_>, ReplicaSetError>>()?;
        if replicas.is_empty() {
            return Err(ReplicaSetError::Empty.into());
        }
        if !replicas.iter().any(|r| r.local() == local) {
            return Err(ReplicaSetError::NotAMember(local).into());
        }

        info!(
            replicas = network.replicas,
            local = local.0,
            shuffled = network.shuffle_seed.is_some(),
            "Cluster created"
        );

        Ok(Self {
            replicas,
            transport: LocalTransport::from_config(network),
            local,
            sink: Arc::new(TracingSink),
            stats: SimulationStats::default(),
            now: Duration::ZERO,
        })
    }

    /// Forward observations to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    /// The replica whose executions have real side effects.
    pub fn local(&self) -> ReplicaId {
        self.local
    }

    /// The local replica's state.
    pub fn local_replica(&self) -> &PbftState {
        // Membership of `local` is checked in `new`.
        &self.replicas[self.position(self.local).unwrap_or(0)]
    }

    /// A replica's state.
    pub fn replica(&self, replica: ReplicaId) -> Option<&PbftState> {
        self.position(replica).map(|i| &self.replicas[i])
    }

    /// All replicas.
    pub fn replicas(&self) -> &[PbftState] {
        &self.replicas
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Whether the cluster has no replicas. Never true once built.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Current view, as seen by the local replica.
    pub fn view(&self) -> ViewNumber {
        self.local_replica().view()
    }

    /// Current primary, as seen by the local replica.
    pub fn primary(&self) -> ReplicaId {
        self.local_replica().primary()
    }

    /// Highest sequence seen by the local replica.
    pub fn highest_sequence(&self) -> SequenceNumber {
        self.local_replica().highest_sequence()
    }

    /// Latest checkpoint of the local replica.
    pub fn last_checkpoint(&self) -> SequenceNumber {
        self.local_replica().last_checkpoint()
    }

    /// Fault-tolerance summary for the cluster size.
    pub fn fault_tolerance(&self) -> FaultTolerance {
        self.local_replica().replicas().fault_tolerance()
    }

    /// Run counters.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// The transport, for partitioning.
    pub fn transport_mut(&mut self) -> &mut LocalTransport {
        &mut self.transport
    }

    /// Set the time seen by every replica.
    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn position(&self, replica: ReplicaId) -> Option<usize> {
        self.replicas.iter().position(|r| r.local() == replica)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════════════

    /// Submit a critical request to the current primary and run to quiescence.
    pub fn submit_critical(&mut self, request: TransactionRequest) -> Vec<ClusterOutput> {
        self.submit_to_primary(Event::SubmitCritical { request })
    }

    /// Submit an unclassified request; the primary's admission step decides.
    pub fn submit(&mut self, request: TransactionRequest) -> Vec<ClusterOutput> {
        self.submit_to_primary(Event::SubmitRequest { request })
    }

    fn submit_to_primary(&mut self, event: Event) -> Vec<ClusterOutput> {
        let primary = self.primary();
        let mut outputs = Vec::new();
        if let Some(index) = self.position(primary) {
            self.dispatch(index, event, &mut outputs);
        }
        self.drain(&mut outputs);
        outputs
    }

    /// Report an execution outcome back to `replica`.
    pub fn complete_execution(
        &mut self,
        replica: ReplicaId,
        digest: Hash,
        outcome: OperationResult,
    ) -> Result<Vec<ClusterOutput>, ClusterError> {
        let index = self
            .position(replica)
            .ok_or(ClusterError::UnknownReplica(replica))?;
        let mut outputs = Vec::new();
        self.dispatch(
            index,
            Event::ExecutionCompleted { digest, outcome },
            &mut outputs,
        );
        self.drain(&mut outputs);
        Ok(outputs)
    }

    /// Explicit view change at the local replica; peers adopt the announced view.
    pub fn request_view_change(&mut self) -> Vec<ClusterOutput> {
        self.on_local(Event::ViewChangeRequested)
    }

    /// Stall-detector tick at the local replica.
    pub fn tick(&mut self, now: Duration) -> Vec<ClusterOutput> {
        self.set_time(now);
        self.on_local(Event::ViewChangeTimer)
    }

    /// Checkpoint every replica at its latest executed sequence.
    pub fn request_checkpoint(&mut self) -> Vec<ClusterOutput> {
        let mut outputs = Vec::new();
        for index in 0..self.replicas.len() {
            self.dispatch(index, Event::CheckpointRequested, &mut outputs);
        }
        self.drain(&mut outputs);
        outputs
    }

    /// Deliver queued messages until none remain.
    pub fn run_until_quiescent(&mut self) -> Vec<ClusterOutput> {
        let mut outputs = Vec::new();
        self.drain(&mut outputs);
        outputs
    }

    fn on_local(&mut self, event: Event) -> Vec<ClusterOutput> {
        let mut outputs = Vec::new();
        if let Some(index) = self.position(self.local) {
            self.dispatch(index, event, &mut outputs);
        }
        self.drain(&mut outputs);
        outputs
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Event loop
    // ═══════════════════════════════════════════════════════════════════════════

    fn drain(&mut self, outputs: &mut Vec<ClusterOutput>) {
        let mut delivered = 0u64;
        while let Some(envelope) = self.transport.next_delivery() {
            delivered += 1;
            let Some(index) = self.position(envelope.to) else {
                continue;
            };
            self.dispatch(
                index,
                Event::MessageReceived {
                    from: envelope.from,
                    message: envelope.message,
                },
                outputs,
            );
        }
        self.stats.messages_delivered += delivered;
        if delivered > 0 {
            debug!(delivered, outputs = outputs.len(), "Cluster quiescent");
        }
    }

    fn dispatch(&mut self, index: usize, event: Event, outputs: &mut Vec<ClusterOutput>) {
        self.stats.events_processed += 1;
        let replica = &mut self.replicas[index];
        replica.set_time(self.now);
        let from = replica.local();
        let actions = replica.handle(event);

        for action in actions {
            match action {
                Action::Broadcast { message } => {
                    for to in self.replicas.iter().map(|r| r.local()) {
                        self.stats.messages_sent += 1;
                        self.transport
                            .send(Envelope::new(from, to, message.clone()));
                    }
                }
                Action::Execute {
                    digest,
                    slot,
                    request,
                } => outputs.push(ClusterOutput::Execute {
                    replica: from,
                    digest,
                    slot,
                    request,
                }),
                Action::EmitReply { digest, message } => outputs.push(ClusterOutput::Reply {
                    replica: from,
                    digest,
                    message,
                }),
                Action::DelegateToRoutine {
                    digest,
                    request,
                    decision,
                } => outputs.push(ClusterOutput::Delegated {
                    digest,
                    request,
                    decision,
                }),
                Action::RequestAbandoned { digest, view } => {
                    outputs.push(ClusterOutput::Abandoned {
                        replica: from,
                        digest,
                        view,
                    })
                }
                Action::RequestRejected { digest, reason } => {
                    outputs.push(ClusterOutput::Rejected {
                        replica: from,
                        digest,
                        reason,
                    })
                }
                Action::Observe(observation) => self.sink.record(&observation),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_core::MemorySink;
    use hybrid_test_helpers::fixtures;
    use hybrid_types::{Phase, RequestStatus};
    use serde_json::json;
    use tracing_test::traced_test;

    fn make_cluster(network: NetworkConfig, pbft: PbftConfig) -> SimulatedCluster {
        SimulatedCluster::new(&network, pbft, AdmissionClassifier::default()).unwrap()
    }

    /// Complete every execution with a stub outcome until nothing is left.
    fn execute_everything(
        cluster: &mut SimulatedCluster,
        mut outputs: Vec<ClusterOutput>,
    ) -> Vec<ClusterOutput> {
        let mut seen = Vec::new();
        while let Some(output) = outputs.pop() {
            if let ClusterOutput::Execute {
                replica, digest, ..
            } = &output
            {
                let more = cluster
                    .complete_execution(*replica, *digest, Ok(json!(null)))
                    .unwrap();
                outputs.extend(more);
            }
            seen.push(output);
        }
        seen
    }

    fn count(outputs: &[ClusterOutput], name: &str) -> usize {
        outputs.iter().filter(|o| o.type_name() == name).count()
    }

    #[traced_test]
    #[test]
    fn test_cluster_commits_critical_request() {
        let sink = Arc::new(MemorySink::new());
        let mut cluster = make_cluster(NetworkConfig::default(), PbftConfig::default())
            .with_sink(sink.clone());
        let request = fixtures::register_farmer();
        let digest = request.digest();

        let outputs = cluster.submit_critical(request);
        assert_eq!(count(&outputs, "Execute"), 4);

        let outputs = execute_everything(&mut cluster, outputs);
        assert_eq!(count(&outputs, "Reply"), 4);
        for replica in cluster.replicas() {
            assert_eq!(replica.status(&digest), RequestStatus::Executed);
        }

        let phases: Vec<Phase> = sink
            .phase_events()
            .into_iter()
            .filter(|e| e.replica == cluster.local())
            .map(|e| e.phase)
            .collect();
        assert_eq!(
            phases,
            vec![Phase::PrePrepare, Phase::Prepare, Phase::Commit, Phase::Reply]
        );
        assert!(cluster.stats().messages_delivered > 0);
    }

    #[traced_test]
    #[test]
    fn test_shuffled_delivery_still_commits() {
        for seed in [1, 2, 3, 42] {
            let network = NetworkConfig::default()
                .with_replicas(7)
                .with_shuffle_seed(seed);
            let mut cluster = make_cluster(network, PbftConfig::default());

            let mut outputs = Vec::new();
            for i in 1..=5 {
                outputs.extend(cluster.submit_critical(fixtures::critical_request(i)));
            }
            let outputs = execute_everything(&mut cluster, outputs);

            assert_eq!(count(&outputs, "Execute"), 35, "seed {seed}");
            assert_eq!(count(&outputs, "Reply"), 35, "seed {seed}");
            assert!(cluster.replicas().iter().all(|r| r.violations() == 0));
        }
    }

    #[traced_test]
    #[test]
    fn test_partition_below_quorum_stalls() {
        let mut cluster = make_cluster(NetworkConfig::default(), PbftConfig::default());
        cluster.transport_mut().partition(ReplicaId(2));
        cluster.transport_mut().partition(ReplicaId(3));

        let request = fixtures::register_farmer();
        let digest = request.digest();
        let outputs = cluster.submit_critical(request);

        assert_eq!(count(&outputs, "Execute"), 0);
        assert_eq!(
            cluster.local_replica().status(&digest),
            RequestStatus::PrePrepared
        );
        assert_eq!(cluster.local_replica().prepare_count(&digest), 2);
    }

    #[traced_test]
    #[test]
    fn test_one_faulty_replica_tolerated() {
        let mut cluster = make_cluster(NetworkConfig::default(), PbftConfig::default());
        cluster.transport_mut().partition(ReplicaId(3));

        let outputs = cluster.submit_critical(fixtures::register_farmer());
        assert_eq!(count(&outputs, "Execute"), 3);
    }

    #[traced_test]
    #[test]
    fn test_view_change_moves_whole_cluster() {
        let mut cluster = make_cluster(NetworkConfig::default(), PbftConfig::default());
        cluster.transport_mut().partition(ReplicaId(3));
        cluster.transport_mut().partition(ReplicaId(2));
        let request = fixtures::register_farmer();
        let outputs = cluster.submit_critical(request.clone());
        assert_eq!(count(&outputs, "Execute"), 0);

        cluster.transport_mut().heal();
        let outputs = cluster.request_view_change();
        assert!(outputs.iter().any(|o| matches!(
            o,
            ClusterOutput::Abandoned { replica, .. } if *replica == cluster.local()
        )));
        assert_eq!(cluster.view(), ViewNumber(1));
        assert_eq!(cluster.primary(), ReplicaId(1));
        assert!(cluster
            .replicas()
            .iter()
            .all(|r| r.view() == ViewNumber(1)));

        // Resubmitted to the new primary, with a fresh sequence.
        let outputs = cluster.submit_critical(request);
        let slots: Vec<Slot> = outputs
            .iter()
            .filter_map(|o| match o {
                ClusterOutput::Execute { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(slots.len(), 4);
        assert!(slots
            .iter()
            .all(|s| *s == Slot::new(ViewNumber(1), SequenceNumber(2))));
    }

    #[traced_test]
    #[test]
    fn test_stall_detector_tick() {
        let pbft = PbftConfig::default().with_view_change_timeout(Duration::from_secs(2));
        let mut cluster = make_cluster(NetworkConfig::default(), pbft);
        for replica in [1, 2, 3] {
            cluster.transport_mut().partition(ReplicaId(replica));
        }
        cluster.set_time(Duration::from_secs(1));
        cluster.submit_critical(fixtures::register_farmer());

        assert!(cluster.tick(Duration::from_secs(2)).is_empty());
        let outputs = cluster.tick(Duration::from_secs(5));
        assert_eq!(count(&outputs, "Abandoned"), 1);
        assert_eq!(cluster.view(), ViewNumber(1));
    }

    #[traced_test]
    #[test]
    fn test_admission_delegation_output() {
        let mut cluster = make_cluster(NetworkConfig::default(), PbftConfig::default());
        let outputs = cluster.submit(fixtures::register_farmer());
        assert_eq!(count(&outputs, "Delegated"), 1);
        assert_eq!(cluster.highest_sequence(), SequenceNumber::ZERO);
    }

    #[traced_test]
    #[test]
    fn test_request_checkpoint_on_all_replicas() {
        let mut cluster = make_cluster(NetworkConfig::default(), PbftConfig::default());
        let outputs = cluster.submit_critical(fixtures::register_farmer());
        execute_everything(&mut cluster, outputs);

        cluster.request_checkpoint();
        for replica in cluster.replicas() {
            assert_eq!(replica.last_checkpoint(), SequenceNumber(1));
            assert_eq!(replica.checkpoints().stable(), SequenceNumber(1));
        }
    }

    #[test]
    fn test_rejects_bad_network() {
        let result = SimulatedCluster::new(
            &NetworkConfig::default().with_local_replica(9),
            PbftConfig::default(),
            AdmissionClassifier::default(),
        );
        assert!(matches!(
            result,
            Err(ClusterError::ReplicaSet(ReplicaSetError::NotAMember(_)))
        ));

        let result = SimulatedCluster::new(
            &NetworkConfig::default().with_replicas(0),
            PbftConfig::default(),
            AdmissionClassifier::default(),
        );
        assert!(matches!(
            result,
            Err(ClusterError::ReplicaSet(ReplicaSetError::Empty))
        ));
    }
}
