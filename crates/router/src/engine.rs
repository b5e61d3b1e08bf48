//! Consensus engine actor.
//!
//! One tokio task owns every replica state machine and the local transport.
//! Callers talk to it through an [`EngineHandle`]; answers come back on
//! oneshot channels keyed by request digest. The task only suspends while
//! waiting for commands or executor completions, so every protocol
//! transition happens atomically inside it.

use crate::ledger::{Admission, ExecutionLedger};
use crate::{NetworkStatus, RouterError, ViewChangeOutcome};
use hybrid_core::{BusinessExecutor, RejectReason};
use hybrid_simulation::{ClusterOutput, SimulatedCluster};
use hybrid_types::{
    ClassificationDecision, ConsensusMessage, Hash, OperationResult, SequenceNumber,
    TransactionRequest, ViewNumber,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What the engine did with a submission.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    /// The local replica executed the request and produced a REPLY.
    Executed {
        /// The REPLY.
        reply: ConsensusMessage,
        /// The local replica's view when the REPLY was handed out.
        current_view: ViewNumber,
    },

    /// Admission classified the request as routine.
    Delegated {
        /// Admission decision.
        decision: ClassificationDecision,
    },
}

type Waiter = oneshot::Sender<Result<EngineOutcome, RouterError>>;

enum Command {
    Submit {
        request: TransactionRequest,
        admission: bool,
        reply: Waiter,
    },
    ViewChange {
        reply: oneshot::Sender<ViewChangeOutcome>,
    },
    Checkpoint {
        reply: oneshot::Sender<SequenceNumber>,
    },
    Status {
        reply: oneshot::Sender<NetworkStatus>,
    },
}

struct Completion {
    digest: Hash,
    outcome: OperationResult,
}

/// Cloneable handle to the engine actor.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Spawn the actor on the current tokio runtime.
    ///
    /// With `tick` set, the stall detector of the local replica is ticked at
    /// that period.
    pub fn spawn(
        cluster: SimulatedCluster,
        executor: Arc<dyn BusinessExecutor>,
        tick: Option<Duration>,
        queue: usize,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(queue.max(1));
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let actor = EngineActor {
            cluster,
            executor,
            ledger: ExecutionLedger::new(),
            waiters: HashMap::new(),
            completions,
            started: Instant::now(),
        };
        tokio::spawn(actor.run(command_rx, completion_rx, tick));
        Self { commands }
    }

    /// Order a critical request and wait for the local REPLY.
    pub async fn submit_critical(
        &self,
        request: TransactionRequest,
        timeout: Duration,
    ) -> Result<EngineOutcome, RouterError> {
        self.submit(request, false, timeout).await
    }

    /// Let the engine's admission step decide, then wait for the outcome.
    pub async fn submit_with_admission(
        &self,
        request: TransactionRequest,
        timeout: Duration,
    ) -> Result<EngineOutcome, RouterError> {
        self.submit(request, true, timeout).await
    }

    async fn submit(
        &self,
        request: TransactionRequest,
        admission: bool,
        timeout: Duration,
    ) -> Result<EngineOutcome, RouterError> {
        let digest = request.digest();
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                request,
                admission,
                reply,
            })
            .await
            .map_err(|_| RouterError::EngineUnavailable)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RouterError::EngineUnavailable),
            Err(_) => {
                warn!(
                    digest = %digest.prefix(),
                    waited = ?timeout,
                    "No reply within consensus timeout"
                );
                Err(RouterError::QuorumNotReached {
                    digest,
                    waited: timeout,
                })
            }
        }
    }

    /// Explicit view change.
    pub async fn view_change(&self) -> Result<ViewChangeOutcome, RouterError> {
        self.ask(|reply| Command::ViewChange { reply }).await
    }

    /// Checkpoint every replica at its latest executed sequence.
    pub async fn checkpoint(&self) -> Result<SequenceNumber, RouterError> {
        self.ask(|reply| Command::Checkpoint { reply }).await
    }

    /// Current engine state.
    pub async fn status(&self) -> Result<NetworkStatus, RouterError> {
        self.ask(|reply| Command::Status { reply }).await
    }

    async fn ask<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RouterError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| RouterError::EngineUnavailable)?;
        rx.await.map_err(|_| RouterError::EngineUnavailable)
    }
}

struct EngineActor {
    cluster: SimulatedCluster,
    executor: Arc<dyn BusinessExecutor>,
    ledger: ExecutionLedger,
    waiters: HashMap<Hash, Vec<Waiter>>,
    completions: mpsc::UnboundedSender<Completion>,
    started: Instant,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl EngineActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        tick: Option<Duration>,
    ) {
        let mut ticker = tick.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        info!(
            replicas = self.cluster.len(),
            local = self.cluster.local().0,
            ticking = ticker.is_some(),
            "Consensus engine started"
        );

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(done) = completions.recv() => self.on_completion(done),
                _ = next_tick(&mut ticker) => self.on_tick(),
            }
        }

        info!(
            executed = self.ledger.executed(),
            "Consensus engine shutting down"
        );
    }

    fn sync_time(&mut self) {
        self.cluster.set_time(self.started.elapsed());
    }

    fn on_command(&mut self, command: Command) {
        self.sync_time();
        match command {
            Command::Submit {
                request,
                admission,
                reply,
            } => self.on_submit(request, admission, reply),
            Command::ViewChange { reply } => {
                let outputs = self.cluster.request_view_change();
                self.process(outputs);
                let _ = reply.send(ViewChangeOutcome {
                    view: self.cluster.view(),
                    primary: self.cluster.primary(),
                });
            }
            Command::Checkpoint { reply } => {
                let outputs = self.cluster.request_checkpoint();
                self.process(outputs);
                let _ = reply.send(self.cluster.last_checkpoint());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn on_submit(&mut self, request: TransactionRequest, admission: bool, reply: Waiter) {
        let digest = request.digest();

        if let Some(cached) = self.cluster.local_replica().reply_for(&digest) {
            debug!(digest = %digest.prefix(), "Replaying cached reply");
            let _ = reply.send(Ok(EngineOutcome::Executed {
                reply: cached.clone(),
                current_view: self.cluster.view(),
            }));
            return;
        }

        // Callers that gave up leave closed senders behind.
        self.waiters.retain(|_, waiters| {
            waiters.retain(|w| !w.is_closed());
            !waiters.is_empty()
        });
        self.waiters.entry(digest).or_default().push(reply);

        let outputs = if admission {
            self.cluster.submit(request)
        } else {
            self.cluster.submit_critical(request)
        };
        self.process(outputs);
    }

    fn on_completion(&mut self, done: Completion) {
        self.sync_time();
        self.ledger.finish(done.digest, done.outcome.clone());
        let local = self.cluster.local();
        match self
            .cluster
            .complete_execution(local, done.digest, done.outcome)
        {
            Ok(outputs) => self.process(outputs),
            Err(e) => warn!(error = %e, "Failed to report execution"),
        }
    }

    fn on_tick(&mut self) {
        self.sync_time();
        let now = self.started.elapsed();
        let outputs = self.cluster.tick(now);
        self.process(outputs);
    }

    fn status(&self) -> NetworkStatus {
        let local = self.cluster.local_replica();
        NetworkStatus {
            replicas: self.cluster.len(),
            local: local.local(),
            primary: local.primary(),
            view: local.view(),
            highest_sequence: local.highest_sequence(),
            last_checkpoint: local.last_checkpoint(),
            last_executed: local.last_executed(),
            in_flight: local.in_flight(),
            view_changes: local.view_change_state().view_changes(),
            fault_tolerance: self.cluster.fault_tolerance(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Cluster outputs
    // ═══════════════════════════════════════════════════════════════════════════

    fn process(&mut self, outputs: Vec<ClusterOutput>) {
        let local = self.cluster.local();
        let mut work: VecDeque<ClusterOutput> = outputs.into();

        while let Some(output) = work.pop_front() {
            match output {
                ClusterOutput::Execute {
                    replica,
                    digest,
                    request,
                    ..
                } => {
                    if replica != local {
                        // Peers own no ledger here; acknowledge without side effects.
                        match self
                            .cluster
                            .complete_execution(replica, digest, Ok(Value::Null))
                        {
                            Ok(more) => work.extend(more),
                            Err(e) => warn!(error = %e, "Failed to acknowledge peer execution"),
                        }
                        continue;
                    }
                    match self.ledger.admit(digest) {
                        Admission::Execute => self.spawn_execution(digest, request),
                        Admission::Running => {
                            debug!(digest = %digest.prefix(), "Execution already running");
                        }
                        Admission::Cached(outcome) => {
                            info!(
                                digest = %digest.prefix(),
                                "Digest executed before, reusing outcome"
                            );
                            match self.cluster.complete_execution(local, digest, outcome) {
                                Ok(more) => work.extend(more),
                                Err(e) => warn!(error = %e, "Failed to report cached execution"),
                            }
                        }
                    }
                }
                ClusterOutput::Reply {
                    replica,
                    digest,
                    message,
                } if replica == local => {
                    let current_view = self.cluster.view();
                    self.resolve(
                        digest,
                        Ok(EngineOutcome::Executed {
                            reply: message,
                            current_view,
                        }),
                    );
                }
                ClusterOutput::Reply { .. } => {}
                ClusterOutput::Delegated {
                    digest, decision, ..
                } => self.resolve(digest, Ok(EngineOutcome::Delegated { decision })),
                ClusterOutput::Abandoned {
                    replica,
                    digest,
                    view,
                } if replica == local => {
                    self.resolve(digest, Err(RouterError::Abandoned { digest, view }));
                }
                ClusterOutput::Abandoned { .. } => {}
                ClusterOutput::Rejected {
                    digest,
                    reason: RejectReason::InProgress { sequence },
                    ..
                } => {
                    debug!(
                        digest = %digest.prefix(),
                        sequence = sequence.0,
                        "Duplicate submission joins in-flight request"
                    );
                }
                ClusterOutput::Rejected { digest, reason, .. } => {
                    self.resolve(digest, Err(RouterError::Rejected(reason)));
                }
            }
        }
    }

    fn spawn_execution(&self, digest: Hash, request: TransactionRequest) {
        debug!(
            digest = %digest.prefix(),
            operation = request.operation(),
            "Invoking executor"
        );
        let executor = Arc::clone(&self.executor);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let outcome = executor
                .execute(request.operation(), request.arguments())
                .await;
            let _ = completions.send(Completion { digest, outcome });
        });
    }

    fn resolve(&mut self, digest: Hash, result: Result<EngineOutcome, RouterError>) {
        let Some(waiters) = self.waiters.remove(&digest) else {
            return;
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}
