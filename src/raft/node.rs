//! Group driver
//!
//! One `RaftNode` task drives a single raft-rs `RawNode`:
//! - Mailbox: peer messages (from the router) and local commands (from the host)
//! - Ticker: one raft tick per RTT
//! - Ready loop: persist, send, apply committed entries, snapshot and compact
//!
//! Proposals are correlated with their committed entries through the entry
//! context, which carries a random proposal ID. Entries replayed after a
//! restart carry IDs from the previous run and complete nothing.
//!
//! On start the driver restores the state machine from the group's latest
//! persisted snapshot; raft then replays the committed entries after it.

use super::errors::RuntimeError;
use super::message::GenericMessage;
use super::runtime::{GroupConfig, LeaderInfo, RuntimeListeners};
use super::state_machine::{StateMachine, UpdateResult};
use super::storage::GroupStorage;
use super::transport::Transport;
use protobuf::Message as ProtobufMessage;
use raft::prelude::*;
use raft::SnapshotStatus;
use slog::{debug, error, info, warn, Logger};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Capacity of each group mailbox.
pub const MAILBOX_CAPACITY: usize = 4096;

const MAX_SIZE_PER_MSG: u64 = 1024 * 1024;
const MAX_INFLIGHT_MSGS: usize = 256;
const MAX_COMMANDS_PER_READY: usize = 256;

/// Reply channel of a proposal
pub type ProposalReply = oneshot::Sender<Result<UpdateResult, RuntimeError>>;

/// Configuration for RaftNode initialization
#[derive(Clone, Debug)]
pub struct RaftNodeConfig {
    pub node_id: u64,
    pub group_id: u64,

    /// Ticks before starting election
    pub election_tick: usize,

    /// Ticks between heartbeats
    pub heartbeat_tick: usize,

    pub check_quorum: bool,
    pub pre_vote: bool,
    pub tick_interval: Duration,

    /// Applied entries between snapshots, zero disables snapshotting
    pub snapshot_entries: u64,

    /// Entries retained behind a snapshot when compacting
    pub compaction_overhead: u64,
}

impl RaftNodeConfig {
    /// One tick per RTT, election and heartbeat expressed in RTTs.
    pub fn from_group(config: &GroupConfig, rtt: Duration) -> Self {
        Self {
            node_id: config.node_id,
            group_id: config.group_id,
            election_tick: config.election_rtt as usize,
            heartbeat_tick: config.heartbeat_rtt as usize,
            check_quorum: config.check_quorum,
            pre_vote: true,
            tick_interval: rtt,
            snapshot_entries: config.snapshot_entries,
            compaction_overhead: config.compaction_overhead,
        }
    }
}

impl Default for RaftNodeConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            group_id: 1,
            election_tick: 10,
            heartbeat_tick: 1,
            check_quorum: true,
            pre_vote: true,
            tick_interval: Duration::from_millis(100),
            snapshot_entries: 0,
            compaction_overhead: 0,
        }
    }
}

/// Work delivered to a group driver
#[derive(Debug)]
pub enum GroupCommand {
    /// A consensus message from a peer
    Peer(GenericMessage),

    /// Replicate `data`; `reply` resolves once it is applied locally
    Propose { data: Vec<u8>, reply: ProposalReply },

    Campaign,
}

/// Drives one group's raft-rs node
pub struct RaftNode {
    config: RaftNodeConfig,
    raw_node: RawNode<GroupStorage>,
    transport: Arc<dyn Transport>,
    mailbox: mpsc::Receiver<GroupCommand>,
    state_machine: Arc<dyn StateMachine>,
    listeners: RuntimeListeners,

    /// Proposals awaiting local application, keyed by proposal ID
    pending: HashMap<Uuid, ProposalReply>,
    applied_index: u64,

    /// Last reported (leader, term)
    last_leader: (u64, u64),
    logger: Logger,
}

impl RaftNode {
    /// Create a driver over `storage`, restoring `state_machine` from the
    /// latest persisted snapshot.
    ///
    /// A group with this node as its only voter campaigns immediately.
    pub fn new(
        config: RaftNodeConfig,
        storage: GroupStorage,
        transport: Arc<dyn Transport>,
        mailbox: mpsc::Receiver<GroupCommand>,
        state_machine: Arc<dyn StateMachine>,
        listeners: RuntimeListeners,
        logger: Logger,
    ) -> Result<Self, RuntimeError> {
        let voters = storage.initial_state()?.conf_state.voters;
        let single_voter = voters == [config.node_id];

        let mut applied_index = 0;
        if let Some(snapshot) = storage.latest_snapshot() {
            applied_index = snapshot.get_metadata().index;
            let mut data: &[u8] = snapshot.get_data();
            state_machine.recover_from_snapshot(&mut data)?;
            info!(logger, "Restored state machine from snapshot"; "index" => applied_index);
            listeners
                .system
                .snapshot_recovered(config.group_id, config.node_id, applied_index);
        }
        if storage.is_restored() {
            let hs = storage.hard_state();
            let last_index = storage.last_index()?;
            info!(logger, "Restarting group from persisted state";
                "term" => hs.term, "commit" => hs.commit, "last_index" => last_index);
        }

        let raft_config = Config {
            id: config.node_id,
            applied: applied_index,
            election_tick: config.election_tick,
            heartbeat_tick: config.heartbeat_tick,
            check_quorum: config.check_quorum,
            pre_vote: config.pre_vote,
            max_size_per_msg: MAX_SIZE_PER_MSG,
            max_inflight_msgs: MAX_INFLIGHT_MSGS,
            ..Default::default()
        };

        let mut raw_node = RawNode::new(&raft_config, storage, &logger)?;
        if single_voter {
            raw_node.campaign()?;
        }

        Ok(Self {
            config,
            raw_node,
            transport,
            mailbox,
            state_machine,
            listeners,
            pending: HashMap::new(),
            applied_index,
            last_leader: (0, 0),
            logger,
        })
    }

    /// Run until `shutdown` fires or the mailbox closes, then fail any
    /// outstanding proposals and close the state machine.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    self.raw_node.tick();
                    self.pending.retain(|_, reply| !reply.is_closed());
                }

                command = self.mailbox.recv() => match command {
                    Some(command) => {
                        self.handle_command(command);
                        for _ in 1..MAX_COMMANDS_PER_READY {
                            match self.mailbox.try_recv() {
                                Ok(command) => self.handle_command(command),
                                Err(_) => break,
                            }
                        }
                    }
                    None => {
                        info!(self.logger, "Mailbox closed, shutting down");
                        break;
                    }
                },
            }

            if let Err(e) = self.on_ready().await {
                error!(self.logger, "Failed to process ready, stopping group"; "error" => %e);
                break;
            }
            self.notify_leader();
        }

        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(RuntimeError::GroupStopped(self.config.group_id)));
        }
        self.state_machine.close();
        info!(self.logger, "Group driver stopped"; "applied_index" => self.applied_index);
    }

    fn handle_command(&mut self, command: GroupCommand) {
        match command {
            GroupCommand::Peer(message) => self.step(message),
            GroupCommand::Propose { data, reply } => self.propose(data, reply),
            GroupCommand::Campaign => {
                if let Err(e) = self.raw_node.campaign() {
                    warn!(self.logger, "Failed to campaign"; "error" => %e);
                }
            }
        }
    }

    fn step(&mut self, message: GenericMessage) {
        match Message::parse_from_bytes(&message.raft_message) {
            Ok(raft_msg) => {
                if let Err(e) = self.raw_node.step(raft_msg) {
                    debug!(self.logger, "Ignored peer message"; "error" => %e);
                }
            }
            Err(e) => warn!(self.logger, "Failed to decode peer message"; "error" => %e),
        }
    }

    fn propose(&mut self, data: Vec<u8>, reply: ProposalReply) {
        let id = Uuid::new_v4();
        match self.raw_node.propose(id.as_bytes().to_vec(), data) {
            Ok(()) => {
                self.pending.insert(id, reply);
            }
            Err(e) => {
                let _ = reply.send(Err(RuntimeError::ProposalDropped {
                    group_id: self.config.group_id,
                    reason: e.to_string(),
                }));
            }
        }
    }

    /// Report (leader, term) if it changed since the last report.
    fn notify_leader(&mut self) {
        let current = (self.raw_node.raft.leader_id, self.raw_node.raft.term);
        if current == self.last_leader {
            return;
        }
        self.last_leader = current;

        info!(self.logger, "Leader updated"; "leader" => current.0, "term" => current.1);
        self.listeners.raft.leader_updated(LeaderInfo {
            group_id: self.config.group_id,
            node_id: self.config.node_id,
            term: current.1,
            leader_id: current.0,
        });
    }

    async fn on_ready(&mut self) -> Result<(), RuntimeError> {
        if !self.raw_node.has_ready() {
            return Ok(());
        }

        let store = self.raw_node.raft.raft_log.store.clone();
        let mut ready = self.raw_node.ready();

        if !ready.messages().is_empty() {
            self.send_messages(ready.take_messages()).await;
        }

        if *ready.snapshot() != Snapshot::default() {
            self.install_snapshot(&store, ready.snapshot().clone())?;
        }

        self.apply_committed(ready.take_committed_entries())?;

        if !ready.entries().is_empty() {
            store.append(ready.entries())?;
        }

        if let Some(hs) = ready.hs() {
            store.set_hard_state(hs)?;
        }

        if !ready.persisted_messages().is_empty() {
            self.send_messages(ready.take_persisted_messages()).await;
        }

        let mut light_rd = self.raw_node.advance(ready);

        if let Some(commit) = light_rd.commit_index() {
            store.set_commit(commit)?;
        }

        self.send_messages(light_rd.take_messages()).await;
        self.apply_committed(light_rd.take_committed_entries())?;
        self.raw_node.advance_apply();

        self.maybe_snapshot(&store)
    }

    fn install_snapshot(&mut self, store: &GroupStorage, snapshot: Snapshot) -> Result<(), RuntimeError> {
        let index = snapshot.get_metadata().index;
        let mut data: &[u8] = snapshot.get_data();
        self.state_machine.recover_from_snapshot(&mut data)?;
        store.apply_snapshot(snapshot)?;
        self.applied_index = index;

        info!(self.logger, "Recovered from snapshot"; "index" => index);
        self.listeners
            .system
            .snapshot_recovered(self.config.group_id, self.config.node_id, index);
        Ok(())
    }

    fn apply_committed(&mut self, entries: Vec<Entry>) -> Result<(), RuntimeError> {
        for entry in entries {
            if entry.index <= self.applied_index {
                continue;
            }

            match entry.get_entry_type() {
                // Empty entry appended by a new leader
                EntryType::EntryNormal if entry.data.is_empty() => {}
                EntryType::EntryNormal => {
                    let result = self.state_machine.update(entry.index, &entry.data);
                    if let Err(e) = &result {
                        warn!(self.logger, "Failed to apply entry"; "index" => entry.index, "error" => %e);
                    }
                    self.complete_proposal(&entry.context, result.map_err(RuntimeError::from));
                }
                EntryType::EntryConfChange => {
                    let cc = ConfChange::parse_from_bytes(&entry.data).map_err(raft::Error::from)?;
                    let cs = self.raw_node.apply_conf_change(&cc)?;
                    self.on_conf_state(cs)?;
                }
                EntryType::EntryConfChangeV2 => {
                    let cc = ConfChangeV2::parse_from_bytes(&entry.data).map_err(raft::Error::from)?;
                    let cs = self.raw_node.apply_conf_change(&cc)?;
                    self.on_conf_state(cs)?;
                }
            }
            self.applied_index = entry.index;
        }
        Ok(())
    }

    fn on_conf_state(&mut self, cs: ConfState) -> Result<(), RuntimeError> {
        info!(self.logger, "Membership changed"; "voters" => ?cs.voters);
        self.raw_node.raft.raft_log.store.set_conf_state(cs)?;
        self.listeners
            .system
            .membership_changed(self.config.group_id, self.config.node_id);
        Ok(())
    }

    fn complete_proposal(&mut self, context: &[u8], result: Result<UpdateResult, RuntimeError>) {
        let Ok(id) = Uuid::from_slice(context) else {
            return;
        };
        if let Some(reply) = self.pending.remove(&id) {
            let _ = reply.send(result);
        }
    }

    /// Snapshot once `snapshot_entries` entries were applied since the last
    /// snapshot, then compact the log behind it.
    fn maybe_snapshot(&mut self, store: &GroupStorage) -> Result<(), RuntimeError> {
        let threshold = self.config.snapshot_entries;
        if threshold == 0 || self.applied_index < store.snapshot_index() + threshold {
            return Ok(());
        }

        let index = self.applied_index;
        let term = self.raw_node.raft.raft_log.term(index)?;
        let conf_state = store.initial_state()?.conf_state;

        let mut data = Vec::new();
        self.state_machine.save_snapshot(&mut data)?;
        let size = data.len();
        store.save_snapshot(index, term, conf_state, data)?;

        let compact_to = index.saturating_sub(self.config.compaction_overhead);
        if compact_to > store.first_index()? {
            store.compact(compact_to)?;
        }

        info!(self.logger, "Saved snapshot";
            "index" => index, "term" => term, "bytes" => size, "compacted_to" => compact_to);
        Ok(())
    }

    async fn send_messages(&mut self, messages: Vec<Message>) {
        for message in messages {
            let to = message.to;
            let is_snapshot = message.get_msg_type() == MessageType::MsgSnapshot;

            let bytes = match message.write_to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(self.logger, "Failed to encode message"; "to" => to, "error" => %e);
                    continue;
                }
            };

            let envelope = GenericMessage::new(self.config.group_id, bytes);
            if let Err(e) = self.transport.send_message(to, envelope).await {
                debug!(self.logger, "Failed to send message"; "to" => to, "error" => %e);
                self.raw_node.report_unreachable(to);
                if is_snapshot {
                    self.raw_node.report_snapshot(to, SnapshotStatus::Failure);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::server::{InProcessMessageSender, InProcessServer};
    use crate::raft::state_machine::ApplyError;
    use crate::raft::test_support::{test_logger, RecordingListener, RecordingStateMachine};
    use crate::raft::transport::TransportLayer;
    use tempfile::TempDir;

    struct Harness {
        node: RaftNode,
        state_machine: Arc<RecordingStateMachine>,
        listener: Arc<RecordingListener>,
        _mailbox: mpsc::Sender<GroupCommand>,
    }

    fn transport() -> Arc<TransportLayer> {
        let server = Arc::new(InProcessServer::new());
        Arc::new(TransportLayer::new(Arc::new(InProcessMessageSender::new(server))))
    }

    fn storage(dir: &TempDir, node_id: u64, voters: Vec<u64>) -> GroupStorage {
        GroupStorage::open(dir.path(), node_id, ConfState::from((voters, vec![]))).unwrap()
    }

    fn harness_with(config: RaftNodeConfig, storage: GroupStorage) -> Harness {
        let (tx, rx) = mpsc::channel(16);
        let state_machine = Arc::new(RecordingStateMachine::default());
        let listener = Arc::new(RecordingListener::default());
        let listeners = RuntimeListeners {
            raft: listener.clone(),
            system: listener.clone(),
        };

        let node = RaftNode::new(
            config,
            storage,
            transport(),
            rx,
            state_machine.clone(),
            listeners,
            test_logger(),
        )
        .unwrap();
        Harness {
            node,
            state_machine,
            listener,
            _mailbox: tx,
        }
    }

    fn harness(dir: &TempDir, config: RaftNodeConfig, voters: Vec<u64>) -> Harness {
        let node_id = config.node_id;
        harness_with(config, storage(dir, node_id, voters))
    }

    async fn drive(node: &mut RaftNode) {
        while node.raw_node.has_ready() {
            node.on_ready().await.unwrap();
        }
        node.notify_leader();
    }

    fn propose(node: &mut RaftNode, data: &[u8]) -> oneshot::Receiver<Result<UpdateResult, RuntimeError>> {
        let (reply, rx) = oneshot::channel();
        node.handle_command(GroupCommand::Propose {
            data: data.to_vec(),
            reply,
        });
        rx
    }

    #[test]
    fn test_config_from_group() {
        let group = GroupConfig::new(2, 7, 1000);
        let config = RaftNodeConfig::from_group(&group, Duration::from_millis(200));

        assert_eq!(config.node_id, 2);
        assert_eq!(config.group_id, 7);
        assert_eq!(config.election_tick, 10);
        assert_eq!(config.heartbeat_tick, 1);
        assert!(config.check_quorum);
        assert_eq!(config.tick_interval, Duration::from_millis(200));
        assert_eq!(config.compaction_overhead, 100);
    }

    #[tokio::test]
    async fn test_single_voter_elects_itself() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(&dir, RaftNodeConfig::default(), vec![1]);
        drive(&mut h.node).await;

        let leaders = h.listener.leaders.lock().clone();
        assert_eq!(leaders, vec![LeaderInfo {
            group_id: 1,
            node_id: 1,
            term: 1,
            leader_id: 1,
        }]);
    }

    #[tokio::test]
    async fn test_proposal_resolves_when_applied() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(&dir, RaftNodeConfig::default(), vec![1]);
        drive(&mut h.node).await;

        let mut rx = propose(&mut h.node, b"first");
        drive(&mut h.node).await;

        let result = rx.try_recv().expect("proposal should be resolved").unwrap();
        assert_eq!(result, UpdateResult { index: 2 });
        assert_eq!(h.state_machine.applied.lock().clone(), vec![(2, b"first".to_vec())]);
    }

    #[tokio::test]
    async fn test_apply_failure_fails_proposal_only() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(&dir, RaftNodeConfig::default(), vec![1]);
        drive(&mut h.node).await;

        let mut bad = propose(&mut h.node, RecordingStateMachine::REJECT);
        let mut good = propose(&mut h.node, b"after");
        drive(&mut h.node).await;

        assert!(matches!(
            bad.try_recv().unwrap(),
            Err(RuntimeError::Apply(ApplyError::Closed))
        ));
        assert_eq!(good.try_recv().unwrap().unwrap(), UpdateResult { index: 3 });
        assert_eq!(h.node.applied_index, 3);
    }

    #[tokio::test]
    async fn test_snapshot_and_compaction() {
        let config = RaftNodeConfig {
            snapshot_entries: 5,
            compaction_overhead: 1,
            ..Default::default()
        };
        let dir = TempDir::new().unwrap();
        let mut h = harness(&dir, config, vec![1]);
        drive(&mut h.node).await;

        for i in 0..12 {
            let mut rx = propose(&mut h.node, format!("entry-{}", i).as_bytes());
            drive(&mut h.node).await;
            assert!(rx.try_recv().unwrap().is_ok());
        }

        // entries 2..=13 applied, snapshots at 5 and 10
        let store = h.node.raw_node.raft.raft_log.store.clone();
        assert_eq!(h.node.applied_index, 13);
        assert_eq!(store.snapshot_index(), 10);
        assert_eq!(store.first_index().unwrap(), 9);
        assert_eq!(h.state_machine.snapshots_taken(), 2);

        let snapshot = store.snapshot(0, 2).unwrap();
        assert_eq!(snapshot.get_metadata().term, 1);
        assert_eq!(snapshot.get_metadata().get_conf_state().voters, vec![1]);
    }

    #[tokio::test]
    async fn test_follower_installs_snapshot() {
        let config = RaftNodeConfig {
            node_id: 2,
            group_id: 4,
            ..Default::default()
        };
        let dir = TempDir::new().unwrap();
        let mut h = harness(&dir, config, vec![1, 2]);

        let mut snapshot = Snapshot::default();
        snapshot.set_data(b"leader-state".to_vec().into());
        let meta = snapshot.mut_metadata();
        meta.index = 20;
        meta.term = 1;
        meta.set_conf_state(ConfState::from((vec![1, 2], vec![])));

        let mut msg = Message::default();
        msg.set_msg_type(MessageType::MsgSnapshot);
        msg.from = 1;
        msg.to = 2;
        msg.term = 1;
        msg.set_snapshot(snapshot);

        let envelope = GenericMessage::new(4, msg.write_to_bytes().unwrap());
        h.node.handle_command(GroupCommand::Peer(envelope));
        drive(&mut h.node).await;

        assert_eq!(h.state_machine.recovered.lock().clone(), vec![b"leader-state".to_vec()]);
        assert_eq!(h.listener.recovered.lock().clone(), vec![(4, 2, 20)]);
        assert_eq!(h.node.applied_index, 20);
        assert_eq!(h.node.raw_node.raft.raft_log.store.first_index().unwrap(), 21);

        let leaders = h.listener.leaders.lock().clone();
        assert_eq!(leaders.last().map(|l| (l.leader_id, l.term)), Some((1, 1)));
    }

    #[tokio::test]
    async fn test_restart_restores_snapshot_and_replays_log() {
        let dir = TempDir::new().unwrap();
        let config = RaftNodeConfig {
            snapshot_entries: 5,
            compaction_overhead: 1,
            ..Default::default()
        };

        {
            let mut h = harness(&dir, config.clone(), vec![1]);
            drive(&mut h.node).await;
            for i in 0..7 {
                let mut rx = propose(&mut h.node, format!("entry-{}", i).as_bytes());
                drive(&mut h.node).await;
                assert!(rx.try_recv().unwrap().is_ok());
            }
            // entries 2..=8 applied, one snapshot at 5 holding "4" applied entries
            assert_eq!(h.node.applied_index, 8);
        }

        let restored = storage(&dir, 1, vec![1]);
        assert!(restored.is_restored());
        let mut h = harness_with(config, restored);
        assert_eq!(h.state_machine.recovered.lock().clone(), vec![b"4".to_vec()]);
        assert_eq!(h.listener.recovered.lock().clone(), vec![(1, 1, 5)]);

        drive(&mut h.node).await;
        // only the entries after the snapshot are replayed, in order
        let replayed: Vec<u64> = h.state_machine.applied.lock().iter().map(|(index, _)| *index).collect();
        assert_eq!(replayed, vec![6, 7, 8]);
        assert_eq!(h.state_machine.applied.lock()[2].1, b"entry-6".to_vec());

        // the restarted single voter leads again in a later term
        let leader = h.listener.leaders.lock().last().cloned().unwrap();
        assert_eq!((leader.leader_id, leader.term), (1, 2));

        let mut rx = propose(&mut h.node, b"after-restart");
        drive(&mut h.node).await;
        assert_eq!(rx.try_recv().unwrap().unwrap(), UpdateResult { index: 10 });
    }

    #[tokio::test]
    async fn test_run_fails_pending_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel(16);
        let state_machine = Arc::new(RecordingStateMachine::default());
        let listener = Arc::new(RecordingListener::default());
        let listeners = RuntimeListeners {
            raft: listener.clone(),
            system: listener,
        };
        // two voters, the peer never answers, so nothing commits
        let config = RaftNodeConfig {
            tick_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let node = RaftNode::new(
            config,
            storage(&dir, 1, vec![1, 2]),
            transport(),
            rx,
            state_machine.clone(),
            listeners,
            test_logger(),
        )
        .unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(node.run(shutdown.clone()));

        tx.send(GroupCommand::Campaign).await.unwrap();
        let (reply, proposal) = oneshot::channel();
        tx.send(GroupCommand::Propose {
            data: b"never".to_vec(),
            reply,
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        task.await.unwrap();

        match proposal.await.unwrap() {
            Err(RuntimeError::GroupStopped(1)) | Err(RuntimeError::ProposalDropped { .. }) => {}
            other => panic!("Expected stopped or dropped proposal, got {:?}", other),
        }
        assert!(state_machine.is_closed());
    }
}
