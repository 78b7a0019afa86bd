//! Node host
//!
//! The raft-rs backed [`ConsensusRuntime`]. A host owns the local raft
//! address, the peer registry, the group router and one driver task per
//! started group.
//!
//! Data directory layout:
//! - `nodehost.json`: the raft address the directory was first used with,
//!   so a misconfigured restart is caught early
//! - `groups/<group_id>/`: one RocksDB log store per group

use super::cluster_router::ClusterRouter;
use super::errors::{RuntimeError, TransportError};
use super::node::{GroupCommand, RaftNode, RaftNodeConfig, MAILBOX_CAPACITY};
use super::runtime::{ConsensusRuntime, GroupConfig, RuntimeLauncher, RuntimeListeners};
use super::server::{tcp, InProcessMessageSender, InProcessServer, TcpMessageSender};
use super::state_machine::{Query, StateMachine, UpdateResult};
use super::storage::GroupStorage;
use super::transport::{MessageSender, Transport, TransportLayer};
use crate::cluster::NodeId;
use async_trait::async_trait;
use parking_lot::Mutex;
use raft::prelude::ConfState;
use serde::{Deserialize, Serialize};
use slog::{info, o, warn, Logger};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Metadata file kept in the data directory.
pub const METADATA_FILE: &str = "nodehost.json";

/// Directory under the data directory holding the per-group log stores.
pub const GROUPS_DIR: &str = "groups";

#[derive(Clone, Debug)]
pub struct NodeHostConfig {
    pub data_dir: PathBuf,
    /// `host:port` this node is reachable at; also the listen address
    pub raft_address: String,
    /// Inter-node round-trip time; one raft tick
    pub rtt: Duration,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeHostMetadata {
    raft_address: String,
}

/// Create the data directory and check it belongs to `raft_address`.
fn prepare_data_dir(data_dir: &Path, raft_address: &str) -> Result<(), RuntimeError> {
    std::fs::create_dir_all(data_dir).map_err(|source| RuntimeError::Storage {
        path: data_dir.to_path_buf(),
        source,
    })?;

    let path = data_dir.join(METADATA_FILE);
    if path.exists() {
        let json = std::fs::read_to_string(&path).map_err(|source| RuntimeError::Storage {
            path: path.clone(),
            source,
        })?;
        let metadata: NodeHostMetadata =
            serde_json::from_str(&json).map_err(|source| RuntimeError::Metadata {
                path: path.clone(),
                source,
            })?;
        if metadata.raft_address != raft_address {
            return Err(RuntimeError::AddressMismatch {
                path,
                expected: metadata.raft_address,
                actual: raft_address.to_string(),
            });
        }
        return Ok(());
    }

    let metadata = NodeHostMetadata {
        raft_address: raft_address.to_string(),
    };
    let json = serde_json::to_vec_pretty(&metadata).map_err(|source| RuntimeError::Metadata {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, json).map_err(|source| RuntimeError::Storage { path, source })
}

enum Server {
    Tcp,
    InProcess(Arc<InProcessServer>),
}

struct GroupHandle {
    mailbox: mpsc::Sender<GroupCommand>,
    state_machine: Arc<dyn StateMachine>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Multi-group raft runtime for one node
pub struct NodeHost {
    config: NodeHostConfig,
    transport: Arc<TransportLayer>,
    router: Arc<ClusterRouter>,
    server: Server,
    groups: Mutex<HashMap<u64, GroupHandle>>,
    listeners: RuntimeListeners,
    shutdown: CancellationToken,
    logger: Logger,
}

impl NodeHost {
    fn with_sender(
        config: NodeHostConfig,
        sender: Arc<dyn MessageSender>,
        server: Server,
        listeners: RuntimeListeners,
        logger: Logger,
    ) -> Result<Self, RuntimeError> {
        prepare_data_dir(&config.data_dir, &config.raft_address)?;
        let logger = logger.new(o!("raft_address" => config.raft_address.clone()));

        Ok(Self {
            config,
            transport: Arc::new(TransportLayer::new(sender)),
            router: Arc::new(ClusterRouter::new()),
            server,
            groups: Mutex::new(HashMap::new()),
            listeners,
            shutdown: CancellationToken::new(),
            logger,
        })
    }

    /// Start a host serving its raft address over TCP.
    pub async fn bind_tcp(
        config: NodeHostConfig,
        listeners: RuntimeListeners,
        logger: Logger,
    ) -> Result<Arc<Self>, RuntimeError> {
        let sender = Arc::new(TcpMessageSender::new(logger.clone()));
        let host = Self::with_sender(config, sender, Server::Tcp, listeners, logger)?;
        tcp::serve(
            &host.config.raft_address,
            host.router.clone(),
            host.shutdown.child_token(),
            host.logger.clone(),
        )
        .await?;

        info!(host.logger, "Node host started"; "data_dir" => %host.config.data_dir.display());
        Ok(Arc::new(host))
    }

    /// Start a host attached to an in-process switchboard.
    pub fn in_process(
        config: NodeHostConfig,
        server: Arc<InProcessServer>,
        listeners: RuntimeListeners,
        logger: Logger,
    ) -> Result<Arc<Self>, RuntimeError> {
        let sender = Arc::new(InProcessMessageSender::new(server.clone()));
        let host = Self::with_sender(config, sender, Server::InProcess(server.clone()), listeners, logger)?;

        let router = host.router.clone();
        server.register(host.config.raft_address.clone(), move |message| {
            router.route_message(message).map_err(TransportError::from)
        });

        info!(host.logger, "Node host started"; "data_dir" => %host.config.data_dir.display());
        Ok(Arc::new(host))
    }

    pub fn raft_address(&self) -> &str {
        &self.config.raft_address
    }

    pub fn group_count(&self) -> usize {
        self.groups.lock().len()
    }

    /// Where `group_id` keeps its log.
    pub fn group_dir(&self, group_id: u64) -> PathBuf {
        self.config.data_dir.join(GROUPS_DIR).join(group_id.to_string())
    }

    /// Ask a group to start an election.
    pub async fn campaign(&self, group_id: u64) -> Result<(), RuntimeError> {
        self.mailbox(group_id)?
            .send(GroupCommand::Campaign)
            .await
            .map_err(|_| RuntimeError::GroupStopped(group_id))
    }

    fn mailbox(&self, group_id: u64) -> Result<mpsc::Sender<GroupCommand>, RuntimeError> {
        self.groups
            .lock()
            .get(&group_id)
            .map(|handle| handle.mailbox.clone())
            .ok_or(RuntimeError::GroupNotFound(group_id))
    }

    async fn shutdown_group(&self, group_id: u64, handle: GroupHandle) {
        self.router.unregister_group(group_id);
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            warn!(self.logger, "Group driver task failed"; "group" => group_id, "error" => %e);
        }
        info!(self.logger, "Group stopped"; "group" => group_id);
    }
}

#[async_trait]
impl ConsensusRuntime for NodeHost {
    async fn start_group(
        &self,
        members: BTreeMap<NodeId, String>,
        config: GroupConfig,
        state_machine: Arc<dyn StateMachine>,
    ) -> Result<(), RuntimeError> {
        if self.shutdown.is_cancelled() {
            return Err(RuntimeError::Closed);
        }

        let group_id = config.group_id;
        let logger = self.logger.new(o!("group" => group_id));
        {
            let mut groups = self.groups.lock();
            if groups.contains_key(&group_id) {
                return Err(RuntimeError::GroupAlreadyStarted(group_id));
            }

            for (node_id, address) in &members {
                if *node_id != config.node_id {
                    self.transport.add_peer(*node_id, address.clone());
                }
            }

            let path = self.group_dir(group_id);
            let voters: Vec<NodeId> = members.keys().copied().collect();
            let storage = GroupStorage::open(&path, config.node_id, ConfState::from((voters, vec![])))
                .map_err(|source| RuntimeError::GroupStorage { group_id, path, source })?;

            let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
            let node = RaftNode::new(
                RaftNodeConfig::from_group(&config, self.config.rtt),
                storage,
                self.transport.clone(),
                rx,
                state_machine.clone(),
                self.listeners.clone(),
                logger.clone(),
            )?;

            self.router.register_group(group_id, tx.clone());
            let cancel = self.shutdown.child_token();
            let task = tokio::spawn(node.run(cancel.clone()));
            groups.insert(
                group_id,
                GroupHandle {
                    mailbox: tx,
                    state_machine,
                    cancel,
                    task,
                },
            );
        }

        info!(logger, "Group started"; "node_id" => config.node_id, "members" => members.len());
        self.listeners.system.node_ready(group_id, config.node_id);
        Ok(())
    }

    async fn stop_group(&self, group_id: u64) -> Result<(), RuntimeError> {
        let handle = self
            .groups
            .lock()
            .remove(&group_id)
            .ok_or(RuntimeError::GroupNotFound(group_id))?;
        self.shutdown_group(group_id, handle).await;
        Ok(())
    }

    async fn propose(&self, group_id: u64, data: Vec<u8>) -> Result<UpdateResult, RuntimeError> {
        let mailbox = self.mailbox(group_id)?;
        let (reply, result) = oneshot::channel();
        mailbox
            .send(GroupCommand::Propose { data, reply })
            .await
            .map_err(|_| RuntimeError::GroupStopped(group_id))?;
        result.await.map_err(|_| RuntimeError::GroupStopped(group_id))?
    }

    async fn read_local(&self, group_id: u64, query: Query) -> Result<(), RuntimeError> {
        let state_machine = self
            .groups
            .lock()
            .get(&group_id)
            .map(|handle| handle.state_machine.clone())
            .ok_or(RuntimeError::GroupNotFound(group_id))?;
        state_machine.lookup(query)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        self.shutdown.cancel();

        let handles: Vec<(u64, GroupHandle)> = self.groups.lock().drain().collect();
        for (group_id, handle) in handles {
            self.shutdown_group(group_id, handle).await;
        }

        if let Server::InProcess(server) = &self.server {
            server.unregister(&self.config.raft_address);
        }
        info!(self.logger, "Node host closed");
        Ok(())
    }
}

/// Launches a [`NodeHost`] serving TCP.
pub struct TcpLauncher {
    pub data_dir: PathBuf,
    pub rtt: Duration,
    pub logger: Logger,
}

#[async_trait]
impl RuntimeLauncher for TcpLauncher {
    async fn launch(
        &self,
        raft_address: &str,
        listeners: RuntimeListeners,
    ) -> Result<Arc<dyn ConsensusRuntime>, RuntimeError> {
        let config = NodeHostConfig {
            data_dir: self.data_dir.clone(),
            raft_address: raft_address.to_string(),
            rtt: self.rtt,
        };
        let host: Arc<dyn ConsensusRuntime> = NodeHost::bind_tcp(config, listeners, self.logger.clone()).await?;
        Ok(host)
    }
}

/// Launches a [`NodeHost`] on an in-process switchboard.
pub struct InProcessLauncher {
    pub server: Arc<InProcessServer>,
    pub data_dir: PathBuf,
    pub rtt: Duration,
    pub logger: Logger,
}

#[async_trait]
impl RuntimeLauncher for InProcessLauncher {
    async fn launch(
        &self,
        raft_address: &str,
        listeners: RuntimeListeners,
    ) -> Result<Arc<dyn ConsensusRuntime>, RuntimeError> {
        let config = NodeHostConfig {
            data_dir: self.data_dir.clone(),
            raft_address: raft_address.to_string(),
            rtt: self.rtt,
        };
        let host: Arc<dyn ConsensusRuntime> =
            NodeHost::in_process(config, self.server.clone(), listeners, self.logger.clone())?;
        Ok(host)
    }
}
