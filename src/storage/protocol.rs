//! Protocol coordinator
//!
//! Brings the local node's storage layer up and down:
//!
//! 1. Resolve member identities; fail fast if the local member is absent
//! 2. Launch the consensus runtime with the event fan-out as its listener
//! 3. Subscribe to leadership events before any group exists
//! 4. Build a state machine and partition group per partition and start it
//! 5. Wait until every partition reports a leader with a non-zero term
//!
//! A failure in any step stops the groups started so far and closes the
//! runtime before the error is returned.

use super::events::{EventFanout, RaftEvent, EVENT_BUFFER};
use super::fsm::PartitionStateMachine;
use super::identity::MemberIdentities;
use super::partition::{stop_groups, PartitionGroup};
use super::stream::StreamRouter;
use crate::cluster::{Cluster, PartitionId};
use crate::config::ProtocolConfig;
use crate::engine::{EngineContext, EngineFactory};
use crate::error::ProtocolError;
use crate::raft::{ConsensusRuntime, GroupConfig, RuntimeError, RuntimeLauncher, RuntimeListeners};
use parking_lot::{Mutex, RwLock};
use slog::{error, info, o, warn, Logger};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolState {
    Uninitialized,
    ResolvingIdentity,
    StartingRuntime,
    StartingGroups,
    AwaitingLeaders,
    Ready,
    Failed,
    Stopped,
}

pub struct Protocol {
    config: ProtocolConfig,
    state: Mutex<ProtocolState>,
    identities: RwLock<Option<Arc<MemberIdentities>>>,
    fanout: RwLock<Option<Arc<EventFanout>>>,
    runtime: Mutex<Option<Arc<dyn ConsensusRuntime>>>,
    groups: RwLock<BTreeMap<PartitionId, Arc<PartitionGroup>>>,
    logger: Logger,
}

impl Protocol {
    pub fn new(config: ProtocolConfig, logger: Logger) -> Self {
        Self {
            config,
            state: Mutex::new(ProtocolState::Uninitialized),
            identities: RwLock::new(None),
            fanout: RwLock::new(None),
            runtime: Mutex::new(None),
            groups: RwLock::new(BTreeMap::new()),
            logger,
        }
    }

    pub fn state(&self) -> ProtocolState {
        *self.state.lock()
    }

    fn set_state(&self, state: ProtocolState) {
        *self.state.lock() = state;
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn identities(&self) -> Option<Arc<MemberIdentities>> {
        self.identities.read().clone()
    }

    /// The group serving `id`.
    pub fn partition(&self, id: PartitionId) -> Result<Arc<PartitionGroup>, ProtocolError> {
        self.groups
            .read()
            .get(&id)
            .cloned()
            .ok_or(ProtocolError::PartitionNotFound(id))
    }

    /// Every registered group, by ascending partition ID.
    pub fn partitions(&self) -> Vec<Arc<PartitionGroup>> {
        self.groups.read().values().cloned().collect()
    }

    /// Forward raft events to `sink` until `cancel` fires.
    pub fn watch(
        &self,
        cancel: CancellationToken,
        sink: mpsc::Sender<RaftEvent>,
    ) -> Result<JoinHandle<()>, ProtocolError> {
        let fanout = self.fanout.read().clone().ok_or(ProtocolError::NotStarted)?;
        Ok(fanout.listen(cancel, sink))
    }

    /// Start the storage layer and wait until every partition has a leader.
    pub async fn start(
        &self,
        cluster: &dyn Cluster,
        engines: Arc<dyn EngineFactory>,
        launcher: &dyn RuntimeLauncher,
    ) -> Result<(), ProtocolError> {
        {
            let mut state = self.state.lock();
            if *state != ProtocolState::Uninitialized {
                return Err(ProtocolError::AlreadyStarted);
            }
            *state = ProtocolState::ResolvingIdentity;
        }

        match self.try_start(cluster, engines, launcher).await {
            Ok(()) => {
                self.set_state(ProtocolState::Ready);
                info!(self.logger, "Protocol ready"; "partitions" => self.groups.read().len());
                Ok(())
            }
            Err(e) => {
                error!(self.logger, "Protocol failed to start"; "error" => %e);
                self.rollback().await;
                self.set_state(ProtocolState::Failed);
                Err(e)
            }
        }
    }

    async fn try_start(
        &self,
        cluster: &dyn Cluster,
        engines: Arc<dyn EngineFactory>,
        launcher: &dyn RuntimeLauncher,
    ) -> Result<(), ProtocolError> {
        let identities = Arc::new(MemberIdentities::resolve(cluster)?);
        *self.identities.write() = Some(identities.clone());
        info!(self.logger, "Resolved member identities";
            "member" => %identities.local_member(), "node_id" => identities.local_node_id(),
            "replicas" => identities.len());

        self.set_state(ProtocolState::StartingRuntime);
        let fanout = Arc::new(EventFanout::new(identities.clone(), self.logger.clone()));
        *self.fanout.write() = Some(fanout.clone());
        let listeners = RuntimeListeners {
            raft: fanout.clone(),
            system: fanout.clone(),
        };
        let runtime = launcher.launch(identities.local_address(), listeners).await?;
        *self.runtime.lock() = Some(runtime.clone());
        info!(self.logger, "Consensus runtime started"; "address" => identities.local_address());

        // Subscribe before any group exists and drain concurrently, so
        // leadership reported while later groups start is counted.
        let partitions: BTreeSet<PartitionId> = cluster.partitions().into_iter().collect();
        let pending = Arc::new(Mutex::new(partitions.clone()));
        let startup = CancellationToken::new();
        let _guard = startup.clone().drop_guard();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        fanout.listen(startup, tx);
        let (ready_tx, ready) = oneshot::channel();
        tokio::spawn(track_leaders(events, pending.clone(), ready_tx, self.logger.clone()));

        self.set_state(ProtocolState::StartingGroups);
        let replicas = cluster.replicas();
        for partition in &partitions {
            let logger = self.logger.new(o!("partition" => partition.0));
            let engine = engines.create(EngineContext {
                partition: *partition,
                replicas: replicas.clone(),
                session_timeout: self.config.session_timeout_or_default(),
            });
            let state_machine = Arc::new(PartitionStateMachine::new(
                *partition,
                engine,
                Arc::new(StreamRouter::new()),
                logger.clone(),
            ));

            let mut group_config = GroupConfig::new(
                identities.local_node_id(),
                partition.group_id(),
                self.config.snapshot_threshold_or_default(),
            );
            group_config.compaction_overhead = self.config.compaction_overhead();

            let group = Arc::new(PartitionGroup::new(
                identities.addresses().clone(),
                group_config,
                runtime.clone(),
                state_machine,
                self.config.proposal_timeout_or_default(),
                logger,
            ));
            self.groups.write().insert(*partition, group.clone());
            group.start().await?;
        }

        self.set_state(ProtocolState::AwaitingLeaders);
        let timeout = self.config.startup_timeout_or_default();
        match tokio::time::timeout(timeout, ready).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RuntimeError::Closed.into()),
            Err(_) => Err(ProtocolError::StartupTimeout {
                timeout,
                pending: pending.lock().iter().copied().collect(),
            }),
        }
    }

    /// Stop whatever a failed start left running.
    async fn rollback(&self) {
        let groups: Vec<Arc<PartitionGroup>> =
            std::mem::take(&mut *self.groups.write()).into_values().collect();
        if let Err(e) = stop_groups(&groups).await {
            warn!(self.logger, "Failed to stop partition during rollback"; "error" => %e);
        }

        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            if let Err(e) = runtime.close().await {
                warn!(self.logger, "Failed to close consensus runtime during rollback"; "error" => %e);
            }
        }
    }

    /// Stop every partition group and release the runtime. Every group is
    /// attempted; the first failure is returned.
    pub async fn stop(&self) -> Result<(), ProtocolError> {
        {
            let mut state = self.state.lock();
            match *state {
                ProtocolState::Uninitialized => return Err(ProtocolError::NotStarted),
                ProtocolState::Stopped => return Ok(()),
                _ => *state = ProtocolState::Stopped,
            }
        }

        let groups: Vec<Arc<PartitionGroup>> =
            std::mem::take(&mut *self.groups.write()).into_values().collect();
        let mut result = stop_groups(&groups).await;

        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            if let Err(e) = runtime.close().await {
                warn!(self.logger, "Failed to close consensus runtime"; "error" => %e);
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }

        info!(self.logger, "Protocol stopped"; "partitions" => groups.len());
        result
    }
}

/// Drain startup events, dropping each partition from `pending` once it
/// reports a leader with a non-zero term. Signals `ready` exactly once.
async fn track_leaders(
    mut events: mpsc::Receiver<RaftEvent>,
    pending: Arc<Mutex<BTreeSet<PartitionId>>>,
    ready: oneshot::Sender<Result<(), ProtocolError>>,
    logger: Logger,
) {
    let result = loop {
        if pending.lock().is_empty() {
            break Ok(());
        }
        match events.recv().await {
            Some(RaftEvent::LeaderUpdated {
                partition,
                term,
                leader: Some(leader),
            }) if term > 0 => {
                let mut waiting = pending.lock();
                if waiting.remove(&partition) {
                    info!(logger, "Partition has a leader";
                        "partition" => partition.0, "leader" => %leader, "term" => term,
                        "pending" => waiting.len());
                }
            }
            Some(_) => {}
            None => break Err(RuntimeError::Closed.into()),
        }
    };
    let _ = ready.send(result);
}
