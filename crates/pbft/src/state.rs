//! PBFT state machine.

use crate::{
    AdmissionClassifier, CheckpointStore, PbftConfig, PendingRequest, PendingRequests,
    ProtocolViolation, QuorumSet, ViewChangeState,
};
use hybrid_core::{Action, Event, RejectReason, StateMachine};
use hybrid_types::{
    CheckpointSnapshot, ConsensusMessage, Hash, MessageBody, OperationResult, Phase, PhaseEvent,
    ReplicaId, ReplicaSetView, RequestStatus, SequenceNumber, Slot, TransactionClass,
    TransactionRequest, ViewNumber,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Protocol record for one digest.
///
/// Votes may arrive before the pre-prepare; such an entry has no slot or
/// request yet and only collects votes.
#[derive(Debug, Clone, Default)]
struct LogEntry {
    slot: Option<Slot>,
    request: Option<TransactionRequest>,
    status: RequestStatus,
    prepares: QuorumSet,
    commits: QuorumSet,
    prepare_sent: bool,
    commit_sent: bool,
    reply: Option<ConsensusMessage>,
}

impl LogEntry {
    fn is_in_flight(&self) -> bool {
        self.slot.is_some()
            && matches!(
                self.status,
                RequestStatus::PrePrepared | RequestStatus::Prepared
            )
    }
}

/// One replica of the agreement protocol.
///
/// Per digest: `NONE -> PRE_PREPARED -> PREPARED -> COMMITTED -> EXECUTED`.
/// Execution itself is performed by the runner in response to
/// [`Action::Execute`]; the runner reports back with
/// [`Event::ExecutionCompleted`].
pub struct PbftState {
    replicas: ReplicaSetView,
    config: PbftConfig,
    admission: AdmissionClassifier,

    /// Per-digest protocol records.
    log: HashMap<Hash, LogEntry>,

    /// Slot -> digest bindings accepted in pre-prepare.
    slots: HashMap<Slot, Hash>,

    pending: PendingRequests,
    checkpoints: CheckpointStore,
    view_change: ViewChangeState,

    /// Highest sequence executed by this replica.
    last_executed: SequenceNumber,

    /// Rejected inbound messages.
    violations: u64,

    now: Duration,
}

impl PbftState {
    /// Create a replica.
    pub fn new(
        replicas: ReplicaSetView,
        config: PbftConfig,
        admission: AdmissionClassifier,
    ) -> Self {
        let view_change = ViewChangeState::new(config.view_change_timeout());
        Self {
            replicas,
            config,
            admission,
            log: HashMap::new(),
            slots: HashMap::new(),
            pending: PendingRequests::default(),
            checkpoints: CheckpointStore::default(),
            view_change,
            last_executed: SequenceNumber::ZERO,
            violations: 0,
            now: Duration::ZERO,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    /// This replica.
    pub fn local(&self) -> ReplicaId {
        self.replicas.local()
    }

    /// Current view.
    pub fn view(&self) -> ViewNumber {
        self.replicas.view()
    }

    /// Current primary.
    pub fn primary(&self) -> ReplicaId {
        self.replicas.primary()
    }

    /// Whether this replica is the current primary.
    pub fn is_primary(&self) -> bool {
        self.replicas.is_primary()
    }

    /// Replica membership and counters.
    pub fn replicas(&self) -> &ReplicaSetView {
        &self.replicas
    }

    /// Configuration in use.
    pub fn config(&self) -> &PbftConfig {
        &self.config
    }

    /// Admission classifier in use.
    pub fn admission(&self) -> &AdmissionClassifier {
        &self.admission
    }

    /// Highest sequence assigned or observed.
    pub fn highest_sequence(&self) -> SequenceNumber {
        self.replicas.highest_sequence()
    }

    /// Sequence of the latest checkpoint.
    pub fn last_checkpoint(&self) -> SequenceNumber {
        self.replicas.last_checkpoint()
    }

    /// Highest sequence executed here.
    pub fn last_executed(&self) -> SequenceNumber {
        self.last_executed
    }

    /// Status of a digest.
    pub fn status(&self, digest: &Hash) -> RequestStatus {
        self.log
            .get(digest)
            .map(|e| e.status)
            .unwrap_or(RequestStatus::None)
    }

    /// Slot a digest is bound to, if any.
    pub fn slot_of(&self, digest: &Hash) -> Option<Slot> {
        self.log.get(digest).and_then(|e| e.slot)
    }

    /// PREPARE votes counted for a digest.
    ///
    /// Once bound, only votes matching the bound slot count.
    pub fn prepare_count(&self, digest: &Hash) -> usize {
        self.log.get(digest).map_or(0, |e| match e.slot {
            Some(slot) => e.prepares.count_matching(slot),
            None => e.prepares.len(),
        })
    }

    /// COMMIT votes counted for a digest.
    pub fn commit_count(&self, digest: &Hash) -> usize {
        self.log.get(digest).map_or(0, |e| match e.slot {
            Some(slot) => e.commits.count_matching(slot),
            None => e.commits.len(),
        })
    }

    /// Cached REPLY for an executed digest.
    pub fn reply_for(&self, digest: &Hash) -> Option<&ConsensusMessage> {
        self.log.get(digest).and_then(|e| e.reply.as_ref())
    }

    /// Number of protocol records held.
    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Number of slot bindings held.
    pub fn bound_slots(&self) -> usize {
        self.slots.len()
    }

    /// Pre-prepared, not yet executed requests.
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Checkpoints taken and announced.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// View-change bookkeeping.
    pub fn view_change_state(&self) -> &ViewChangeState {
        &self.view_change
    }

    /// Requests pre-prepared or prepared but not yet committed.
    pub fn in_flight(&self) -> usize {
        self.log.values().filter(|e| e.is_in_flight()).count()
    }

    /// Inbound messages rejected so far.
    pub fn violations(&self) -> u64 {
        self.violations
    }

    fn now_ms(&self) -> u64 {
        self.now.as_millis() as u64
    }

    fn observe(&self, phase: Phase, slot: Slot, digest: &Hash) -> Action {
        Action::Observe(
            PhaseEvent::new(
                phase,
                self.local(),
                slot.view,
                slot.sequence,
                digest,
                self.now_ms(),
            )
            .into(),
        )
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Submission
    // ═══════════════════════════════════════════════════════════════════════════

    /// Unclassified submission: admission decides first.
    fn on_submit_request(&mut self, request: TransactionRequest) -> Vec<Action> {
        let decision = self.admission.classify(&request);
        if decision.class == TransactionClass::Routine {
            let digest = request.digest();
            info!(
                replica = self.local().0,
                operation = request.operation(),
                digest = %digest.prefix(),
                "Admission delegated request to routine path"
            );
            return vec![Action::DelegateToRoutine {
                digest,
                request,
                decision,
            }];
        }
        self.on_submit_critical(request)
    }

    /// Critical submission: the primary assigns a sequence and pre-prepares.
    fn on_submit_critical(&mut self, request: TransactionRequest) -> Vec<Action> {
        let digest = request.digest();

        if let Some(entry) = self.log.get(&digest) {
            if let Some(reply) = &entry.reply {
                debug!(
                    replica = self.local().0,
                    digest = %digest.prefix(),
                    "Request already executed, replaying reply"
                );
                return vec![Action::EmitReply {
                    digest,
                    message: reply.clone(),
                }];
            }
            if let Some(slot) = entry.slot {
                debug!(
                    replica = self.local().0,
                    digest = %digest.prefix(),
                    sequence = slot.sequence.0,
                    "Request already in progress"
                );
                return vec![Action::RequestRejected {
                    digest,
                    reason: RejectReason::InProgress {
                        sequence: slot.sequence,
                    },
                }];
            }
        }

        if !self.is_primary() {
            debug!(
                replica = self.local().0,
                primary = self.primary().0,
                digest = %digest.prefix(),
                "Not primary, rejecting submission"
            );
            return vec![Action::RequestRejected {
                digest,
                reason: RejectReason::NotPrimary {
                    primary: self.primary(),
                },
            }];
        }

        let sequence = self.replicas.next_sequence();
        let slot = Slot::new(self.view(), sequence);

        info!(
            replica = self.local().0,
            view = slot.view.0,
            sequence = sequence.0,
            digest = %digest.prefix(),
            operation = request.operation(),
            "PBFT pre-prepare"
        );

        let message = ConsensusMessage::pre_prepare(
            slot,
            digest,
            self.local(),
            self.now_ms(),
            request.clone(),
        );
        let mut actions = vec![
            self.observe(Phase::PrePrepare, slot, &digest),
            Action::Broadcast { message },
        ];
        actions.extend(self.bind_and_prepare(digest, slot, request));
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Inbound messages
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_message(&mut self, from: ReplicaId, message: ConsensusMessage) -> Vec<Action> {
        let phase = message.phase();
        let view = message.view;
        let sequence = message.sequence;
        let digest = message.digest;

        let result = match message.body {
            MessageBody::PrePrepare { ref request } => {
                let request = request.clone();
                self.on_pre_prepare(from, &message, request)
            }
            MessageBody::Prepare => self.on_vote(from, &message, Phase::Prepare),
            MessageBody::Commit => self.on_vote(from, &message, Phase::Commit),
            MessageBody::ViewChange => self.on_view_change_message(from, &message),
            MessageBody::Checkpoint { ref snapshot } => {
                let snapshot = snapshot.clone();
                self.on_checkpoint_message(from, &message, snapshot)
            }
            MessageBody::Reply { .. } => {
                debug!(
                    replica = self.local().0,
                    from = from.0,
                    "Ignoring reply delivered to a replica"
                );
                Ok(vec![])
            }
        };

        match result {
            Ok(actions) => actions,
            Err(violation) => {
                self.violations += 1;
                if violation.is_stale() {
                    debug!(
                        replica = self.local().0,
                        from = from.0,
                        phase = %phase,
                        view = view.0,
                        sequence = sequence.0,
                        digest = %digest.prefix(),
                        error = %violation,
                        "Rejected stale message"
                    );
                } else {
                    warn!(
                        replica = self.local().0,
                        from = from.0,
                        phase = %phase,
                        view = view.0,
                        sequence = sequence.0,
                        digest = %digest.prefix(),
                        error = %violation,
                        "Protocol violation"
                    );
                }
                vec![]
            }
        }
    }

    /// Sender must be a replica and match the transport sender.
    fn check_sender(
        &self,
        from: ReplicaId,
        message: &ConsensusMessage,
    ) -> Result<(), ProtocolViolation> {
        if !self.replicas.contains(message.sender) {
            return Err(ProtocolViolation::UnknownSender(message.sender));
        }
        if from != message.sender {
            return Err(ProtocolViolation::SenderMismatch {
                from,
                claimed: message.sender,
            });
        }
        Ok(())
    }

    /// `message.view == current view && message.sequence > last checkpoint`.
    fn check_window(&self, message: &ConsensusMessage) -> Result<(), ProtocolViolation> {
        if message.view != self.view() {
            return Err(ProtocolViolation::StaleView {
                message_view: message.view,
                current_view: self.view(),
            });
        }
        if message.sequence <= self.last_checkpoint() {
            return Err(ProtocolViolation::StaleSequence {
                sequence: message.sequence,
                last_checkpoint: self.last_checkpoint(),
            });
        }
        Ok(())
    }

    fn on_pre_prepare(
        &mut self,
        from: ReplicaId,
        message: &ConsensusMessage,
        request: TransactionRequest,
    ) -> Result<Vec<Action>, ProtocolViolation> {
        self.check_sender(from, message)?;
        self.check_window(message)?;

        let primary = self.replicas.primary_for(message.view);
        if message.sender != primary {
            return Err(ProtocolViolation::NotPrimary {
                sender: message.sender,
                primary,
            });
        }

        let computed = request.digest();
        if computed != message.digest {
            return Err(ProtocolViolation::DigestMismatch {
                claimed: message.digest,
                computed,
            });
        }

        let digest = message.digest;
        let slot = message.slot();

        if let Some(bound) = self.slots.get(&slot) {
            if *bound != digest {
                return Err(ProtocolViolation::Equivocation {
                    slot,
                    bound: *bound,
                    received: digest,
                });
            }
            // Our own pre-prepare looping back, or a duplicate delivery.
            return Ok(vec![]);
        }

        if let Some(existing) = self.log.get(&digest).and_then(|e| e.slot) {
            return Err(ProtocolViolation::Rebinding { digest, existing });
        }

        debug!(
            replica = self.local().0,
            view = slot.view.0,
            sequence = slot.sequence.0,
            digest = %digest.prefix(),
            "Accepted pre-prepare"
        );

        let mut actions = vec![self.observe(Phase::PrePrepare, slot, &digest)];
        actions.extend(self.bind_and_prepare(digest, slot, request));
        Ok(actions)
    }

    /// Bind a digest to a slot, track it as pending and send our PREPARE.
    fn bind_and_prepare(
        &mut self,
        digest: Hash,
        slot: Slot,
        request: TransactionRequest,
    ) -> Vec<Action> {
        if self.in_flight() == 0 {
            // Work arriving after an idle period is not a stall.
            self.view_change.reset_timeout();
        }

        let now_ms = self.now_ms();
        let local = self.local();

        self.slots.insert(slot, digest);
        self.replicas.observe_sequence(slot.sequence);
        self.pending
            .insert(digest, PendingRequest::new(request.clone(), now_ms));

        let entry = self.log.entry(digest).or_default();
        entry.slot = Some(slot);
        entry.request = Some(request);
        entry.status = RequestStatus::PrePrepared;

        let mut actions = Vec::new();
        if !entry.prepare_sent {
            entry.prepare_sent = true;
            actions.push(Action::Broadcast {
                message: ConsensusMessage::prepare(slot, digest, local, now_ms),
            });
            actions.push(self.observe(Phase::Prepare, slot, &digest));
        }

        actions.extend(self.try_advance(digest));
        actions
    }

    fn on_vote(
        &mut self,
        from: ReplicaId,
        message: &ConsensusMessage,
        phase: Phase,
    ) -> Result<Vec<Action>, ProtocolViolation> {
        self.check_sender(from, message)?;
        self.check_window(message)?;

        let digest = message.digest;
        let slot = message.slot();
        let entry = self.log.entry(digest).or_default();

        if entry.status == RequestStatus::Executed {
            return Ok(vec![]);
        }

        let votes = match phase {
            Phase::Prepare => &mut entry.prepares,
            _ => &mut entry.commits,
        };
        if !votes.insert(message.sender, slot, message.timestamp_ms) {
            debug!(
                replica = self.local().0,
                from = message.sender.0,
                phase = %phase,
                digest = %digest.prefix(),
                "Duplicate vote ignored"
            );
            return Ok(vec![]);
        }

        self.replicas.observe_sequence(slot.sequence);
        Ok(self.try_advance(digest))
    }

    /// Move a digest forward as far as its collected votes allow.
    fn try_advance(&mut self, digest: Hash) -> Vec<Action> {
        let required = self.replicas.required_messages();
        let local = self.local();
        let now_ms = self.now_ms();

        let Some(entry) = self.log.get_mut(&digest) else {
            return vec![];
        };
        let (Some(slot), Some(request)) = (entry.slot, entry.request.as_ref()) else {
            return vec![];
        };

        let mut actions = Vec::new();
        let mut phases = Vec::new();

        if entry.status == RequestStatus::PrePrepared && entry.prepares.has_quorum(slot, required)
        {
            entry.status = RequestStatus::Prepared;
            debug!(
                replica = local.0,
                sequence = slot.sequence.0,
                digest = %digest.prefix(),
                prepares = entry.prepares.count_matching(slot),
                required,
                "Prepared"
            );
            if !entry.commit_sent {
                entry.commit_sent = true;
                actions.push(Action::Broadcast {
                    message: ConsensusMessage::commit(slot, digest, local, now_ms),
                });
                phases.push(Phase::Commit);
            }
        }

        if entry.status == RequestStatus::Prepared && entry.commits.has_quorum(slot, required) {
            entry.status = RequestStatus::Committed;
            info!(
                replica = local.0,
                view = slot.view.0,
                sequence = slot.sequence.0,
                digest = %digest.prefix(),
                commits = entry.commits.count_matching(slot),
                "PBFT committed, executing"
            );
            actions.push(Action::Execute {
                digest,
                slot,
                request: request.clone(),
            });
        }

        for phase in phases {
            actions.push(self.observe(phase, slot, &digest));
        }
        actions
    }

    fn on_view_change_message(
        &mut self,
        from: ReplicaId,
        message: &ConsensusMessage,
    ) -> Result<Vec<Action>, ProtocolViolation> {
        self.check_sender(from, message)?;

        let announced = self
            .view_change
            .record_announcement(message.view, message.sender);
        self.replicas.observe_sequence(message.sequence);

        if message.view <= self.view() {
            debug!(
                replica = self.local().0,
                from = message.sender.0,
                announced_view = message.view.0,
                current_view = self.view().0,
                announced,
                "View change announcement for current or older view"
            );
            return Ok(vec![]);
        }

        info!(
            replica = self.local().0,
            from = message.sender.0,
            new_view = message.view.0,
            "Adopting view announced by peer"
        );
        Ok(self.enter_view(message.view))
    }

    fn on_checkpoint_message(
        &mut self,
        from: ReplicaId,
        message: &ConsensusMessage,
        snapshot: CheckpointSnapshot,
    ) -> Result<Vec<Action>, ProtocolViolation> {
        self.check_sender(from, message)?;
        let required = self.replicas.required_messages();
        if self
            .checkpoints
            .attest(snapshot.sequence, message.sender, required)
        {
            info!(
                replica = self.local().0,
                sequence = snapshot.sequence.0,
                "Checkpoint stable"
            );
        }
        Ok(vec![])
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Execution and checkpoints
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_execution_completed(&mut self, digest: Hash, outcome: OperationResult) -> Vec<Action> {
        let local = self.local();
        let now_ms = self.now_ms();

        let Some(entry) = self.log.get_mut(&digest) else {
            warn!(
                replica = local.0,
                digest = %digest.prefix(),
                "Execution completed for unknown digest"
            );
            return vec![];
        };
        let Some(slot) = entry.slot else {
            return vec![];
        };
        if entry.status != RequestStatus::Committed {
            warn!(
                replica = local.0,
                digest = %digest.prefix(),
                status = ?entry.status,
                "Execution completed for digest that is not committed"
            );
            return vec![];
        }

        entry.status = RequestStatus::Executed;
        let succeeded = outcome.is_ok();
        let reply = ConsensusMessage::reply(slot, digest, local, now_ms, outcome);
        entry.reply = Some(reply.clone());

        self.pending.remove(&digest);
        if slot.sequence > self.last_executed {
            self.last_executed = slot.sequence;
        }
        self.view_change.reset_timeout();

        info!(
            replica = local.0,
            view = slot.view.0,
            sequence = slot.sequence.0,
            digest = %digest.prefix(),
            succeeded,
            "PBFT executed"
        );

        let mut actions = vec![
            self.observe(Phase::Reply, slot, &digest),
            Action::EmitReply {
                digest,
                message: reply,
            },
        ];

        if slot
            .sequence
            .is_multiple_of(self.config.checkpoint_interval)
        {
            actions.extend(self.take_checkpoint(slot.sequence));
        }
        actions
    }

    fn on_checkpoint_requested(&mut self) -> Vec<Action> {
        if self.last_executed == SequenceNumber::ZERO {
            debug!(replica = self.local().0, "Nothing executed, no checkpoint");
            return vec![];
        }
        self.take_checkpoint(self.last_executed)
    }

    /// Snapshot `{view, sequence, primary}` and garbage-collect behind it.
    fn take_checkpoint(&mut self, sequence: SequenceNumber) -> Vec<Action> {
        if sequence <= self.last_checkpoint() {
            debug!(
                replica = self.local().0,
                sequence = sequence.0,
                last_checkpoint = self.last_checkpoint().0,
                "Checkpoint not newer than last, skipping"
            );
            return vec![];
        }

        let snapshot = CheckpointSnapshot {
            view: self.view(),
            sequence,
            primary: self.primary(),
            created_at_ms: self.now_ms(),
        };
        self.checkpoints.record(snapshot.clone());
        self.replicas.set_last_checkpoint(sequence);

        info!(
            replica = self.local().0,
            view = snapshot.view.0,
            sequence = sequence.0,
            "Checkpoint created"
        );

        let slot = Slot::new(snapshot.view, sequence);
        let mut actions = self.garbage_collect(sequence);
        actions.push(self.observe(Phase::Checkpoint, slot, &Hash::ZERO));
        actions.push(Action::Broadcast {
            message: ConsensusMessage::checkpoint(snapshot, self.local()),
        });
        actions
    }

    /// Discard every record with sequence at or below
    /// `checkpoint - checkpoint_interval`.
    fn garbage_collect(&mut self, checkpoint: SequenceNumber) -> Vec<Action> {
        let cutoff = checkpoint.saturating_sub(self.config.checkpoint_interval);
        if cutoff == SequenceNumber::ZERO {
            return vec![];
        }

        let mut removed = Vec::new();
        let mut abandoned = Vec::new();
        self.log.retain(|digest, entry| {
            entry.prepares.discard_through(cutoff);
            entry.commits.discard_through(cutoff);
            let keep = match entry.slot {
                Some(slot) => slot.sequence > cutoff,
                None => !entry.prepares.is_empty() || !entry.commits.is_empty(),
            };
            if !keep {
                removed.push(*digest);
                if let Some(slot) = entry.slot {
                    if entry.status != RequestStatus::Executed {
                        abandoned.push((*digest, slot.view));
                    }
                }
            }
            keep
        });

        for digest in &removed {
            self.pending.remove(digest);
        }
        self.slots.retain(|slot, _| slot.sequence > cutoff);
        self.checkpoints.discard_through(cutoff);

        debug!(
            replica = self.local().0,
            cutoff = cutoff.0,
            removed = removed.len(),
            retained = self.log.len(),
            "Garbage collected"
        );

        abandoned
            .into_iter()
            .map(|(digest, view)| Action::RequestAbandoned { digest, view })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // View change
    // ═══════════════════════════════════════════════════════════════════════════

    /// Explicit view change: move to `view + 1` and announce it.
    fn start_view_change(&mut self) -> Vec<Action> {
        let new_view = self.view().next();
        let mut actions = self.enter_view(new_view);
        actions.push(Action::Broadcast {
            message: ConsensusMessage::view_change(
                new_view,
                self.highest_sequence(),
                self.local(),
                self.now_ms(),
            ),
        });
        actions
    }

    /// Switch to `new_view`, abandoning everything not yet committed.
    ///
    /// Committed entries keep their slot and pending record: their execution
    /// may already be running and its REPLY still has to go out.
    fn enter_view(&mut self, new_view: ViewNumber) -> Vec<Action> {
        let old_view = self.view();
        if !self.replicas.adopt_view(new_view) {
            return vec![];
        }
        self.view_change.apply_view_change(new_view);

        let mut abandoned = Vec::new();
        self.log.retain(|digest, entry| {
            if matches!(
                entry.status,
                RequestStatus::Committed | RequestStatus::Executed
            ) {
                return true;
            }
            if let Some(slot) = entry.slot {
                abandoned.push((*digest, slot.view));
            }
            false
        });
        for (digest, _) in &abandoned {
            self.pending.remove(digest);
        }
        let log = &self.log;
        self.slots.retain(|_, digest| log.contains_key(digest));

        info!(
            replica = self.local().0,
            old_view = old_view.0,
            new_view = new_view.0,
            primary = self.primary().0,
            abandoned = abandoned.len(),
            "View change"
        );

        let slot = Slot::new(new_view, self.highest_sequence());
        let mut actions = vec![self.observe(Phase::ViewChange, slot, &Hash::ZERO)];
        actions.extend(
            abandoned
                .into_iter()
                .map(|(digest, view)| Action::RequestAbandoned { digest, view }),
        );
        actions
    }

    fn on_view_change_timer(&mut self) -> Vec<Action> {
        if self.view_change.on_view_change_timer(self.in_flight()) {
            return self.start_view_change();
        }
        vec![]
    }
}

impl StateMachine for PbftState {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::SubmitRequest { request } => self.on_submit_request(request),
            Event::SubmitCritical { request } => self.on_submit_critical(request),
            Event::MessageReceived { from, message } => self.on_message(from, message),
            Event::ExecutionCompleted { digest, outcome } => {
                self.on_execution_completed(digest, outcome)
            }
            Event::ViewChangeRequested => self.start_view_change(),
            Event::ViewChangeTimer => self.on_view_change_timer(),
            Event::CheckpointRequested => self.on_checkpoint_requested(),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.view_change.set_time(now);
    }

    fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_test_helpers::fixtures;
    use serde_json::json;
    use std::collections::VecDeque;
    use tracing_test::traced_test;

    fn make_node(n: usize, local: u64, config: PbftConfig) -> PbftState {
        let replicas = ReplicaSetView::with_count(n, ReplicaId(local)).unwrap();
        PbftState::new(replicas, config, AdmissionClassifier::default())
    }

    fn slot(view: u64, sequence: u64) -> Slot {
        Slot::new(ViewNumber(view), SequenceNumber(sequence))
    }

    fn pre_prepare(sequence: u64, sender: u64, request: &TransactionRequest) -> ConsensusMessage {
        ConsensusMessage::pre_prepare(
            slot(0, sequence),
            request.digest(),
            ReplicaId(sender),
            0,
            request.clone(),
        )
    }

    fn deliver(node: &mut PbftState, message: ConsensusMessage) -> Vec<Action> {
        node.handle(Event::MessageReceived {
            from: message.sender,
            message,
        })
    }

    fn has_execute(actions: &[Action]) -> bool {
        actions.iter().any(|a| matches!(a, Action::Execute { .. }))
    }

    fn count_broadcasts(actions: &[Action], phase: Phase) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, Action::Broadcast { message } if message.phase() == phase))
            .count()
    }

    /// Cluster of replicas wired by an in-order message queue.
    struct Harness {
        nodes: Vec<PbftState>,
        queue: VecDeque<(ReplicaId, ReplicaId, ConsensusMessage)>,
        executes: Vec<(ReplicaId, Hash, Slot)>,
        to_execute: Vec<(usize, Hash)>,
        replies: Vec<(ReplicaId, Hash)>,
        abandoned: Vec<(ReplicaId, Hash)>,
        rejected: Vec<(ReplicaId, RejectReason)>,
        delegated: Vec<Hash>,
    }

    impl Harness {
        fn new(n: usize, config: PbftConfig) -> Self {
            Self {
                nodes: (0..n as u64)
                    .map(|i| make_node(n, i, config.clone()))
                    .collect(),
                queue: VecDeque::new(),
                executes: Vec::new(),
                to_execute: Vec::new(),
                replies: Vec::new(),
                abandoned: Vec::new(),
                rejected: Vec::new(),
                delegated: Vec::new(),
            }
        }

        fn apply(&mut self, index: usize, actions: &[Action]) {
            let local = self.nodes[index].local();
            for action in actions {
                match action {
                    Action::Broadcast { message } => {
                        for to in self.nodes.iter().map(|n| n.local()) {
                            self.queue.push_back((local, to, message.clone()));
                        }
                    }
                    Action::Execute { digest, slot, .. } => {
                        self.executes.push((local, *digest, *slot));
                        self.to_execute.push((index, *digest));
                    }
                    Action::EmitReply { digest, .. } => self.replies.push((local, *digest)),
                    Action::RequestAbandoned { digest, .. } => {
                        self.abandoned.push((local, *digest))
                    }
                    Action::RequestRejected { reason, .. } => {
                        self.rejected.push((local, reason.clone()))
                    }
                    Action::DelegateToRoutine { digest, .. } => self.delegated.push(*digest),
                    Action::Observe(_) => {}
                }
            }
        }

        fn handle(&mut self, index: usize, event: Event) -> Vec<Action> {
            let actions = self.nodes[index].handle(event);
            self.apply(index, &actions);
            actions
        }

        fn run(&mut self) {
            while let Some((from, to, message)) = self.queue.pop_front() {
                self.handle(to.0 as usize, Event::MessageReceived { from, message });
            }
        }

        fn execute_all(&mut self) {
            for (index, digest) in std::mem::take(&mut self.to_execute) {
                self.handle(
                    index,
                    Event::ExecutionCompleted {
                        digest,
                        outcome: Ok(json!({ "ok": true })),
                    },
                );
            }
        }

        fn settle(&mut self) {
            loop {
                self.run();
                if self.to_execute.is_empty() {
                    break;
                }
                self.execute_all();
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Agreement
    // ═══════════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_full_cycle_for_cluster_sizes() {
        for n in [1, 4, 7] {
            let mut h = Harness::new(n, PbftConfig::default());
            let request = fixtures::register_farmer();
            let digest = request.digest();

            h.handle(0, Event::SubmitCritical { request });
            h.settle();

            assert_eq!(h.executes.len(), n, "one execution per replica for n={n}");
            assert_eq!(h.replies.len(), n);
            for node in &h.nodes {
                assert_eq!(node.status(&digest), RequestStatus::Executed);
                assert_eq!(node.slot_of(&digest), Some(slot(0, 1)));
                assert_eq!(node.last_executed(), SequenceNumber(1));
                assert!(node.pending().is_empty());
                assert!(node.reply_for(&digest).is_some());
            }
            assert!(h.rejected.is_empty());
        }
        assert!(logs_contain("PBFT committed, executing"));
    }

    #[traced_test]
    #[test]
    fn test_sequences_are_assigned_in_order() {
        let mut h = Harness::new(4, PbftConfig::default());
        for i in 1..=3 {
            h.handle(
                0,
                Event::SubmitCritical {
                    request: fixtures::critical_request(i),
                },
            );
        }
        h.settle();

        let sequences: Vec<u64> = h
            .executes
            .iter()
            .filter(|(replica, _, _)| *replica == ReplicaId(0))
            .map(|(_, _, slot)| slot.sequence.0)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(h.nodes[2].highest_sequence(), SequenceNumber(3));
    }

    #[traced_test]
    #[test]
    fn test_two_prepares_never_commit() {
        let mut node = make_node(4, 1, PbftConfig::default());
        let request = fixtures::register_farmer();
        let digest = request.digest();

        let actions = deliver(&mut node, pre_prepare(1, 0, &request));
        assert_eq!(count_broadcasts(&actions, Phase::Prepare), 1);
        assert_eq!(node.status(&digest), RequestStatus::PrePrepared);

        deliver(&mut node, ConsensusMessage::prepare(slot(0, 1), digest, ReplicaId(0), 0));
        deliver(&mut node, ConsensusMessage::prepare(slot(0, 1), digest, ReplicaId(1), 0));
        assert_eq!(node.prepare_count(&digest), 2);
        assert_eq!(node.status(&digest), RequestStatus::PrePrepared);

        // Commits arriving before the prepare quorum are held, not acted on.
        for sender in [0, 2, 3] {
            let actions = deliver(
                &mut node,
                ConsensusMessage::commit(slot(0, 1), digest, ReplicaId(sender), 0),
            );
            assert!(!has_execute(&actions));
        }
        assert_eq!(node.commit_count(&digest), 3);
        assert_eq!(node.status(&digest), RequestStatus::PrePrepared);

        let actions = deliver(
            &mut node,
            ConsensusMessage::prepare(slot(0, 1), digest, ReplicaId(2), 0),
        );
        assert_eq!(count_broadcasts(&actions, Phase::Commit), 1);
        assert!(has_execute(&actions));
        assert_eq!(node.status(&digest), RequestStatus::Committed);
    }

    #[traced_test]
    #[test]
    fn test_votes_before_pre_prepare_are_kept() {
        let mut node = make_node(4, 1, PbftConfig::default());
        let request = fixtures::register_farmer();
        let digest = request.digest();

        for sender in [0, 2, 3] {
            deliver(
                &mut node,
                ConsensusMessage::prepare(slot(0, 1), digest, ReplicaId(sender), 0),
            );
        }
        assert_eq!(node.status(&digest), RequestStatus::None);
        assert_eq!(node.prepare_count(&digest), 3);
        assert_eq!(node.in_flight(), 0);

        let actions = deliver(&mut node, pre_prepare(1, 0, &request));
        assert_eq!(node.status(&digest), RequestStatus::Prepared);
        assert_eq!(count_broadcasts(&actions, Phase::Commit), 1);
    }

    #[traced_test]
    #[test]
    fn test_duplicate_pre_prepare_sends_one_prepare() {
        let mut node = make_node(4, 2, PbftConfig::default());
        let request = fixtures::register_farmer();

        let first = deliver(&mut node, pre_prepare(1, 0, &request));
        let second = deliver(&mut node, pre_prepare(1, 0, &request));
        assert_eq!(count_broadcasts(&first, Phase::Prepare), 1);
        assert!(second.is_empty());
        assert_eq!(node.violations(), 0);
    }

    #[traced_test]
    #[test]
    fn test_execute_emitted_once() {
        let mut h = Harness::new(4, PbftConfig::default());
        let request = fixtures::register_farmer();
        let digest = request.digest();
        h.handle(0, Event::SubmitCritical { request });
        h.run();

        assert_eq!(h.executes.len(), 4);
        for sender in 1..4 {
            let actions = deliver(
                &mut h.nodes[0],
                ConsensusMessage::commit(slot(0, 1), digest, ReplicaId(sender), 0),
            );
            assert!(!has_execute(&actions));
        }

        h.execute_all();
        h.run();
        let actions = deliver(
            &mut h.nodes[0],
            ConsensusMessage::commit(slot(0, 1), digest, ReplicaId(3), 0),
        );
        assert!(actions.is_empty());
        assert_eq!(h.nodes[0].status(&digest), RequestStatus::Executed);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Rejections
    // ═══════════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_equivocation_rejected() {
        let mut node = make_node(4, 1, PbftConfig::default());
        let first = fixtures::register_farmer();
        let second = fixtures::critical_request(7);

        deliver(&mut node, pre_prepare(1, 0, &first));
        let actions = deliver(&mut node, pre_prepare(1, 0, &second));

        assert!(actions.is_empty());
        assert_eq!(node.violations(), 1);
        assert_eq!(node.slot_of(&first.digest()), Some(slot(0, 1)));
        assert_eq!(node.status(&second.digest()), RequestStatus::None);
        assert!(logs_contain("Protocol violation"));
    }

    #[traced_test]
    #[test]
    fn test_rebinding_rejected() {
        let mut node = make_node(4, 1, PbftConfig::default());
        let request = fixtures::register_farmer();

        deliver(&mut node, pre_prepare(1, 0, &request));
        deliver(&mut node, pre_prepare(2, 0, &request));

        assert_eq!(node.violations(), 1);
        assert_eq!(node.slot_of(&request.digest()), Some(slot(0, 1)));
        assert_eq!(node.bound_slots(), 1);
    }

    #[traced_test]
    #[test]
    fn test_stale_view_rejected() {
        let mut node = make_node(4, 1, PbftConfig::default());
        let digest = fixtures::register_farmer().digest();

        let actions = deliver(
            &mut node,
            ConsensusMessage::prepare(slot(1, 1), digest, ReplicaId(2), 0),
        );
        assert!(actions.is_empty());
        assert_eq!(node.prepare_count(&digest), 0);
        assert_eq!(node.violations(), 1);
        assert!(logs_contain("Rejected stale message"));
    }

    #[traced_test]
    #[test]
    fn test_pre_prepare_from_non_primary_rejected() {
        let mut node = make_node(4, 1, PbftConfig::default());
        let request = fixtures::register_farmer();

        let actions = deliver(&mut node, pre_prepare(1, 2, &request));
        assert!(actions.is_empty());
        assert_eq!(node.status(&request.digest()), RequestStatus::None);
        assert_eq!(node.violations(), 1);
    }

    #[traced_test]
    #[test]
    fn test_digest_mismatch_rejected() {
        let mut node = make_node(4, 1, PbftConfig::default());
        let request = fixtures::register_farmer();
        let other = fixtures::critical_request(1);

        let message = ConsensusMessage::pre_prepare(
            slot(0, 1),
            other.digest(),
            ReplicaId(0),
            0,
            request.clone(),
        );
        deliver(&mut node, message);
        assert_eq!(node.violations(), 1);
        assert_eq!(node.bound_slots(), 0);
    }

    #[traced_test]
    #[test]
    fn test_unknown_and_mismatched_senders_rejected() {
        let mut node = make_node(4, 1, PbftConfig::default());
        let digest = fixtures::register_farmer().digest();

        deliver(
            &mut node,
            ConsensusMessage::prepare(slot(0, 1), digest, ReplicaId(9), 0),
        );
        node.handle(Event::MessageReceived {
            from: ReplicaId(3),
            message: ConsensusMessage::prepare(slot(0, 1), digest, ReplicaId(2), 0),
        });

        assert_eq!(node.violations(), 2);
        assert_eq!(node.prepare_count(&digest), 0);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Submission
    // ═══════════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_non_primary_rejects_submission() {
        let mut node = make_node(4, 1, PbftConfig::default());
        let actions = node.handle(Event::SubmitCritical {
            request: fixtures::register_farmer(),
        });

        assert!(matches!(
            actions.as_slice(),
            [Action::RequestRejected {
                reason: RejectReason::NotPrimary { primary: ReplicaId(0) },
                ..
            }]
        ));
        assert_eq!(node.highest_sequence(), SequenceNumber::ZERO);
    }

    #[traced_test]
    #[test]
    fn test_in_progress_submission_rejected() {
        let mut node = make_node(4, 0, PbftConfig::default());
        let request = fixtures::register_farmer();

        node.handle(Event::SubmitCritical {
            request: request.clone(),
        });
        let actions = node.handle(Event::SubmitCritical { request });

        assert!(matches!(
            actions.as_slice(),
            [Action::RequestRejected {
                reason: RejectReason::InProgress { .. },
                ..
            }]
        ));
        assert_eq!(node.highest_sequence(), SequenceNumber(1));
    }

    #[traced_test]
    #[test]
    fn test_admission_delegates_routine() {
        let mut h = Harness::new(1, PbftConfig::default());

        h.handle(
            0,
            Event::SubmitRequest {
                request: fixtures::register_farmer(),
            },
        );
        assert_eq!(h.delegated, vec![fixtures::register_farmer().digest()]);
        assert_eq!(h.nodes[0].highest_sequence(), SequenceNumber::ZERO);

        let batch = fixtures::create_tea_batch();
        h.handle(
            0,
            Event::SubmitRequest {
                request: batch.clone(),
            },
        );
        h.settle();
        assert_eq!(h.nodes[0].status(&batch.digest()), RequestStatus::Executed);
        assert!(logs_contain("Admission delegated request to routine path"));
    }

    #[traced_test]
    #[test]
    fn test_replay_emits_cached_reply() {
        let mut h = Harness::new(4, PbftConfig::default());
        let request = fixtures::register_farmer();
        let digest = request.digest();
        h.handle(
            0,
            Event::SubmitCritical {
                request: request.clone(),
            },
        );
        h.settle();
        let executed = h.executes.len();

        let actions = h.handle(0, Event::SubmitCritical { request });
        h.settle();

        assert!(matches!(
            actions.as_slice(),
            [Action::EmitReply { digest: d, .. }] if *d == digest
        ));
        assert_eq!(h.executes.len(), executed);
        assert_eq!(h.nodes[0].highest_sequence(), SequenceNumber(1));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // View change
    // ═══════════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_view_change_cycles_primaries() {
        let mut node = make_node(4, 0, PbftConfig::default());
        let mut primaries = Vec::new();
        for _ in 0..4 {
            let actions = node.handle(Event::ViewChangeRequested);
            assert_eq!(count_broadcasts(&actions, Phase::ViewChange), 1);
            primaries.push(node.primary().0);
        }
        assert_eq!(primaries, vec![1, 2, 3, 0]);
        assert_eq!(node.view(), ViewNumber(4));
        assert_eq!(node.view_change_state().view_changes(), 4);
    }

    #[traced_test]
    #[test]
    fn test_view_change_abandons_in_flight() {
        let mut h = Harness::new(4, PbftConfig::default());
        let request = fixtures::register_farmer();
        let digest = request.digest();

        h.handle(0, Event::SubmitCritical { request });
        assert_eq!(h.nodes[0].in_flight(), 1);

        h.handle(0, Event::ViewChangeRequested);
        assert_eq!(h.abandoned, vec![(ReplicaId(0), digest)]);
        assert_eq!(h.nodes[0].status(&digest), RequestStatus::None);
        assert_eq!(h.nodes[0].in_flight(), 0);
        assert!(h.nodes[0].pending().is_empty());
        assert_eq!(h.nodes[0].bound_slots(), 0);

        // Old-view traffic still queued is now stale everywhere.
        h.settle();
        assert!(h.executes.is_empty());
        assert!(h.nodes.iter().all(|n| n.view() == ViewNumber(1)));
    }

    #[traced_test]
    #[test]
    fn test_view_change_keeps_committed_work() {
        let mut h = Harness::new(4, PbftConfig::default());
        let request = fixtures::register_farmer();
        let digest = request.digest();

        h.handle(0, Event::SubmitCritical { request });
        h.run();
        assert_eq!(h.to_execute.len(), 4);

        // Executions are still running when the view moves on.
        h.handle(0, Event::ViewChangeRequested);
        h.run();
        assert!(h.abandoned.is_empty());
        for node in &h.nodes {
            assert_eq!(node.view(), ViewNumber(1));
            assert_eq!(node.status(&digest), RequestStatus::Committed);
            assert_eq!(node.slot_of(&digest), Some(slot(0, 1)));
            assert_eq!(node.in_flight(), 0);
            assert_eq!(node.bound_slots(), 1);
        }

        h.execute_all();
        assert_eq!(h.replies.len(), 4);
        assert!(h.abandoned.is_empty());
        for node in &h.nodes {
            assert_eq!(node.status(&digest), RequestStatus::Executed);
            assert_eq!(node.last_executed(), SequenceNumber(1));
            assert!(node.pending().is_empty());
            let reply = node.reply_for(&digest).unwrap();
            assert_eq!(reply.view, ViewNumber(0));
        }

        // The new primary continues after the committed slot.
        let next = fixtures::critical_request(2);
        let next_digest = next.digest();
        h.handle(1, Event::SubmitCritical { request: next });
        h.settle();
        for node in &h.nodes {
            assert_eq!(node.status(&next_digest), RequestStatus::Executed);
            assert_eq!(node.slot_of(&next_digest), Some(slot(1, 2)));
        }
    }

    #[traced_test]
    #[test]
    fn test_peer_adopts_announced_view() {
        let mut h = Harness::new(4, PbftConfig::default());
        h.handle(2, Event::ViewChangeRequested);
        h.run();

        for node in &h.nodes {
            assert_eq!(node.view(), ViewNumber(1));
            assert_eq!(node.primary(), ReplicaId(1));
        }
        assert!(logs_contain("Adopting view announced by peer"));

        h.handle(
            1,
            Event::SubmitCritical {
                request: fixtures::register_farmer(),
            },
        );
        h.settle();
        assert_eq!(h.executes.len(), 4);
        assert!(h.executes.iter().all(|(_, _, s)| s.view == ViewNumber(1)));
    }

    #[traced_test]
    #[test]
    fn test_stall_detector_triggers_view_change() {
        let config = PbftConfig::default().with_view_change_timeout(Duration::from_secs(5));
        let mut node = make_node(4, 0, config);

        node.set_time(Duration::from_secs(1));
        node.handle(Event::SubmitCritical {
            request: fixtures::register_farmer(),
        });

        node.set_time(Duration::from_secs(3));
        assert!(node.handle(Event::ViewChangeTimer).is_empty());
        assert_eq!(node.view(), ViewNumber(0));

        node.set_time(Duration::from_secs(10));
        let actions = node.handle(Event::ViewChangeTimer);
        assert_eq!(node.view(), ViewNumber(1));
        assert_eq!(count_broadcasts(&actions, Phase::ViewChange), 1);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::RequestAbandoned { .. })));
        assert!(logs_contain("triggering view change"));
    }

    #[traced_test]
    #[test]
    fn test_stall_detector_idle_without_work() {
        let config = PbftConfig::default().with_view_change_timeout(Duration::from_secs(5));
        let mut node = make_node(4, 0, config);
        node.set_time(Duration::from_secs(60));
        assert!(node.handle(Event::ViewChangeTimer).is_empty());
        assert_eq!(node.view(), ViewNumber(0));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Checkpoints
    // ═══════════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_checkpoint_garbage_collection() {
        let config = PbftConfig::default().with_checkpoint_interval(2);
        let mut h = Harness::new(4, config);

        for i in 1..=6 {
            h.handle(
                0,
                Event::SubmitCritical {
                    request: fixtures::critical_request(i),
                },
            );
            h.settle();
        }

        assert_eq!(h.executes.len(), 24);
        assert!(h.abandoned.is_empty());
        for node in &h.nodes {
            assert_eq!(node.last_executed(), SequenceNumber(6));
            assert_eq!(node.last_checkpoint(), SequenceNumber(6));
            // Only sequences above 6 - 2 survive.
            assert_eq!(node.log_len(), 2);
            assert_eq!(node.bound_slots(), 2);
            assert_eq!(node.checkpoints().len(), 1);
            assert_eq!(node.checkpoints().stable(), SequenceNumber(6));
        }
        assert!(h.nodes[0]
            .reply_for(&fixtures::critical_request(1).digest())
            .is_none());
        assert!(h.nodes[0]
            .reply_for(&fixtures::critical_request(6).digest())
            .is_some());
    }

    #[traced_test]
    #[test]
    fn test_votes_below_checkpoint_are_stale() {
        let config = PbftConfig::default().with_checkpoint_interval(1);
        let mut h = Harness::new(1, config);
        h.handle(
            0,
            Event::SubmitCritical {
                request: fixtures::register_farmer(),
            },
        );
        h.settle();
        assert_eq!(h.nodes[0].last_checkpoint(), SequenceNumber(1));

        let digest = fixtures::critical_request(3).digest();
        deliver(
            &mut h.nodes[0],
            ConsensusMessage::prepare(slot(0, 1), digest, ReplicaId(0), 0),
        );
        assert_eq!(h.nodes[0].violations(), 1);
    }

    #[traced_test]
    #[test]
    fn test_explicit_checkpoint_request() {
        let mut h = Harness::new(1, PbftConfig::default());
        assert!(h.handle(0, Event::CheckpointRequested).is_empty());

        h.handle(
            0,
            Event::SubmitCritical {
                request: fixtures::register_farmer(),
            },
        );
        h.settle();
        assert_eq!(h.nodes[0].last_checkpoint(), SequenceNumber::ZERO);

        let actions = h.handle(0, Event::CheckpointRequested);
        assert_eq!(count_broadcasts(&actions, Phase::Checkpoint), 1);
        h.run();

        let node = &h.nodes[0];
        assert_eq!(node.last_checkpoint(), SequenceNumber(1));
        assert_eq!(node.checkpoints().len(), 1);
        assert_eq!(node.checkpoints().stable(), SequenceNumber(1));
        assert!(logs_contain("Checkpoint created"));

        // Same sequence again is a no-op.
        assert!(h.handle(0, Event::CheckpointRequested).is_empty());
    }
}
