//! Consensus runtime contract
//!
//! The storage layer talks to the replicated-log engine only through the
//! traits in this module: [`ConsensusRuntime`] to manage groups and submit
//! work, [`RaftEventListener`] and [`SystemEventListener`] to observe them,
//! and [`RuntimeLauncher`] to bring a runtime up on the local raft address.

use super::errors::RuntimeError;
use super::state_machine::{Query, StateMachine, UpdateResult};
use crate::cluster::NodeId;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Election timeout, in RTTs.
pub const ELECTION_RTT: u64 = 10;

/// Heartbeat interval, in RTTs.
pub const HEARTBEAT_RTT: u64 = 1;

/// Per-group consensus settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupConfig {
    pub node_id: NodeId,
    pub group_id: u64,
    pub election_rtt: u64,
    pub heartbeat_rtt: u64,
    pub check_quorum: bool,
    /// Applied entries between snapshots; zero disables snapshotting.
    pub snapshot_entries: u64,
    /// Entries kept in the log behind each snapshot.
    pub compaction_overhead: u64,
}

impl GroupConfig {
    pub fn new(node_id: NodeId, group_id: u64, snapshot_entries: u64) -> Self {
        Self {
            node_id,
            group_id,
            election_rtt: ELECTION_RTT,
            heartbeat_rtt: HEARTBEAT_RTT,
            check_quorum: true,
            snapshot_entries,
            compaction_overhead: snapshot_entries / 10,
        }
    }
}

/// Leadership observation for one group.
///
/// `leader_id` is zero while no leader is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaderInfo {
    pub group_id: u64,
    pub node_id: NodeId,
    pub term: u64,
    pub leader_id: NodeId,
}

/// Receives leadership changes. Called from group driver tasks; must not block.
pub trait RaftEventListener: Send + Sync {
    fn leader_updated(&self, info: LeaderInfo);
}

/// Receives lifecycle notifications. Called from runtime tasks; must not block.
pub trait SystemEventListener: Send + Sync {
    fn node_ready(&self, group_id: u64, node_id: NodeId);
    fn membership_changed(&self, group_id: u64, node_id: NodeId);
    fn snapshot_recovered(&self, group_id: u64, node_id: NodeId, index: u64);
}

/// The listeners a runtime reports to.
#[derive(Clone)]
pub struct RuntimeListeners {
    pub raft: Arc<dyn RaftEventListener>,
    pub system: Arc<dyn SystemEventListener>,
}

/// Multi-group replicated-log engine
#[async_trait]
pub trait ConsensusRuntime: Send + Sync {
    /// Start a group whose voters are `members` (node ID to raft address).
    async fn start_group(
        &self,
        members: BTreeMap<NodeId, String>,
        config: GroupConfig,
        state_machine: Arc<dyn StateMachine>,
    ) -> Result<(), RuntimeError>;

    async fn stop_group(&self, group_id: u64) -> Result<(), RuntimeError>;

    /// Replicate `data` and resolve once it has been applied on this node.
    async fn propose(&self, group_id: u64, data: Vec<u8>) -> Result<UpdateResult, RuntimeError>;

    /// Serve a query from this node's state without going through the log.
    async fn read_local(&self, group_id: u64, query: Query) -> Result<(), RuntimeError>;

    /// Stop every remaining group and release the runtime.
    async fn close(&self) -> Result<(), RuntimeError>;
}

/// Brings up a [`ConsensusRuntime`] bound to the local raft address.
#[async_trait]
pub trait RuntimeLauncher: Send + Sync {
    async fn launch(
        &self,
        raft_address: &str,
        listeners: RuntimeListeners,
    ) -> Result<Arc<dyn ConsensusRuntime>, RuntimeError>;
}
