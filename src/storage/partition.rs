//! Partition group
//!
//! Owns one partition's consensus group on the local node: starting and
//! stopping it in the runtime, and submitting commands and local reads.

use super::entry::Entry;
use super::fsm::PartitionStateMachine;
use super::stream::{StreamId, StreamRouter};
use crate::cluster::{NodeId, PartitionId};
use crate::engine::{StreamResult, WriteStream};
use crate::error::ProtocolError;
use crate::raft::{ConsensusRuntime, GroupConfig, Query, RuntimeError, StateMachine, UpdateResult};
use bytes::Bytes;
use slog::{debug, info, warn, Logger};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupState {
    Created,
    Started,
    Stopped,
}

pub struct PartitionGroup {
    partition: PartitionId,
    members: BTreeMap<NodeId, String>,
    config: GroupConfig,
    runtime: Arc<dyn ConsensusRuntime>,
    state_machine: Arc<PartitionStateMachine>,
    proposal_timeout: Duration,
    state: Mutex<GroupState>,
    logger: Logger,
}

impl PartitionGroup {
    pub fn new(
        members: BTreeMap<NodeId, String>,
        config: GroupConfig,
        runtime: Arc<dyn ConsensusRuntime>,
        state_machine: Arc<PartitionStateMachine>,
        proposal_timeout: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            partition: state_machine.partition(),
            members,
            config,
            runtime,
            state_machine,
            proposal_timeout,
            state: Mutex::new(GroupState::Created),
            logger,
        }
    }

    pub fn id(&self) -> PartitionId {
        self.partition
    }

    pub fn state_machine(&self) -> &Arc<PartitionStateMachine> {
        &self.state_machine
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    pub async fn state(&self) -> GroupState {
        *self.state.lock().await
    }

    fn streams(&self) -> &StreamRouter {
        self.state_machine.streams()
    }

    /// Start the group in the runtime. Starting a started group does nothing.
    pub async fn start(&self) -> Result<(), ProtocolError> {
        let mut state = self.state.lock().await;
        match *state {
            GroupState::Started => return Ok(()),
            GroupState::Stopped => {
                return Err(ProtocolError::GroupStart {
                    partition: self.partition,
                    source: RuntimeError::GroupStopped(self.config.group_id),
                })
            }
            GroupState::Created => {}
        }

        let state_machine = self.state_machine.clone();
        self.runtime
            .start_group(self.members.clone(), self.config.clone(), state_machine)
            .await
            .map_err(|source| ProtocolError::GroupStart {
                partition: self.partition,
                source,
            })?;

        *state = GroupState::Started;
        info!(self.logger, "Partition group started";
            "node_id" => self.config.node_id, "members" => self.members.len(),
            "snapshot_entries" => self.config.snapshot_entries);
        Ok(())
    }

    /// Stop the group. Stopping a stopped or never started group returns
    /// `Ok`. A failed stop leaves the group started so it can be retried.
    pub async fn stop(&self) -> Result<(), ProtocolError> {
        let mut state = self.state.lock().await;
        match *state {
            GroupState::Started => {}
            GroupState::Created => {
                *state = GroupState::Stopped;
                return Ok(());
            }
            GroupState::Stopped => return Ok(()),
        }

        if let Err(source) = self.runtime.stop_group(self.config.group_id).await {
            warn!(self.logger, "Failed to stop partition group"; "error" => %source);
            return Err(ProtocolError::GroupStop {
                partition: self.partition,
                source,
            });
        }

        *state = GroupState::Stopped;
        self.state_machine.close();
        info!(self.logger, "Partition group stopped");
        Ok(())
    }

    /// Replicate `payload` and apply it. The engine's response is written to
    /// `stream` when the entry is applied on this node.
    pub async fn command(
        &self,
        payload: impl Into<Bytes>,
        stream: WriteStream,
    ) -> Result<UpdateResult, ProtocolError> {
        let id = StreamId::generate();
        self.streams().register(id.clone(), stream)?;
        let entry = Entry::new(&id, payload);

        let result = tokio::time::timeout(
            self.proposal_timeout,
            self.runtime.propose(self.config.group_id, entry.encode_to_bytes()),
        )
        .await;

        // Applied entries already took their stream; this only clears abandoned calls.
        if self.streams().unregister(&id) {
            debug!(self.logger, "Unregistered unanswered stream"; "stream" => %id);
        }

        match result {
            Ok(Ok(update)) => Ok(update),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProtocolError::ProposalTimeout {
                partition: self.partition,
                timeout: self.proposal_timeout,
            }),
        }
    }

    /// Local, non-quorum read against this replica's current state.
    pub async fn query(&self, payload: impl Into<Bytes>, stream: WriteStream) -> Result<(), ProtocolError> {
        self.runtime
            .read_local(self.config.group_id, Query::new(payload, stream))
            .await?;
        Ok(())
    }

    /// Run a command and wait for its first response.
    pub async fn execute(&self, payload: impl Into<Bytes>) -> Result<Bytes, ProtocolError> {
        let (stream, rx) = WriteStream::channel();
        self.command(payload, stream).await?;
        first_response(rx).await
    }

    /// Run a local read and wait for its first response.
    pub async fn read(&self, payload: impl Into<Bytes>) -> Result<Bytes, ProtocolError> {
        let (stream, rx) = WriteStream::channel();
        self.query(payload, stream).await?;
        first_response(rx).await
    }
}

async fn first_response(mut rx: mpsc::UnboundedReceiver<StreamResult>) -> Result<Bytes, ProtocolError> {
    match rx.recv().await {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(ProtocolError::Engine(e)),
        None => Err(ProtocolError::StreamClosed),
    }
}

/// Stop every group, returning the first failure after all were attempted.
pub async fn stop_groups<'a>(
    groups: impl IntoIterator<Item = &'a Arc<PartitionGroup>>,
) -> Result<(), ProtocolError> {
    let mut first_error = None;
    for group in groups {
        if let Err(e) = group.stop().await {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, KvEngine};
    use crate::raft::test_support::{test_logger, RecordingListener};
    use crate::raft::{InProcessServer, NodeHost, NodeHostConfig, RuntimeListeners};

    struct Fixture {
        host: Arc<NodeHost>,
        group: PartitionGroup,
        _dir: tempfile::TempDir,
    }

    fn fixture(proposal_timeout: Duration) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let listener = Arc::new(RecordingListener::default());
        let host = NodeHost::in_process(
            NodeHostConfig {
                data_dir: dir.path().to_path_buf(),
                raft_address: "a:5679".to_string(),
                rtt: Duration::from_millis(10),
            },
            Arc::new(InProcessServer::new()),
            RuntimeListeners {
                raft: listener.clone(),
                system: listener,
            },
            test_logger(),
        )
        .unwrap();

        let partition = PartitionId(1);
        let state_machine = Arc::new(PartitionStateMachine::new(
            partition,
            Box::new(KvEngine::new(partition)),
            Arc::new(StreamRouter::new()),
            test_logger(),
        ));
        let group = PartitionGroup::new(
            BTreeMap::from([(1, "a:5679".to_string())]),
            GroupConfig::new(1, partition.group_id(), 100),
            host.clone(),
            state_machine,
            proposal_timeout,
            test_logger(),
        );
        Fixture { host, group, _dir: dir }
    }

    #[tokio::test]
    async fn test_command_and_read() {
        let f = fixture(Duration::from_secs(5));
        f.group.start().await.unwrap();
        f.group.start().await.unwrap();
        assert_eq!(f.group.state().await, GroupState::Started);

        assert_eq!(f.group.execute("SET x=1").await.unwrap(), Bytes::from("OK"));
        assert_eq!(f.group.read("GET x").await.unwrap(), Bytes::from("1"));
        assert!(f.group.state_machine().streams().is_empty());

        assert!(matches!(
            f.group.execute("JUMP").await,
            Err(ProtocolError::Engine(EngineError::InvalidCommand(_)))
        ));

        f.group.stop().await.unwrap();
        f.host.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_reaches_runtime_once() {
        let f = fixture(Duration::from_secs(5));
        f.group.stop().await.unwrap();

        let f = fixture(Duration::from_secs(5));
        f.group.start().await.unwrap();
        f.group.stop().await.unwrap();
        f.group.stop().await.unwrap();
        assert_eq!(f.group.state().await, GroupState::Stopped);
        assert_eq!(f.host.group_count(), 0);
        assert!(f.group.state_machine().is_closed());

        assert!(matches!(f.group.start().await, Err(ProtocolError::GroupStart { .. })));
    }

    #[tokio::test]
    async fn test_failed_stop_can_be_retried() {
        let f = fixture(Duration::from_secs(5));
        f.group.start().await.unwrap();

        // The runtime no longer knows the group.
        f.host.stop_group(1).await.unwrap();
        assert!(matches!(
            f.group.stop().await,
            Err(ProtocolError::GroupStop {
                partition: PartitionId(1),
                ..
            })
        ));
        assert_eq!(f.group.state().await, GroupState::Started);
        assert!(!f.group.state_machine().is_closed());

        let state_machine: Arc<dyn StateMachine> = f.group.state_machine().clone();
        f.host
            .start_group(
                BTreeMap::from([(1, "a:5679".to_string())]),
                f.group.config().clone(),
                state_machine,
            )
            .await
            .unwrap();
        assert_eq!(f.host.group_count(), 1);

        f.group.stop().await.unwrap();
        assert_eq!(f.group.state().await, GroupState::Stopped);
        assert_eq!(f.host.group_count(), 0);
        assert!(f.group.state_machine().is_closed());
        f.host.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_command_on_unstarted_group_releases_stream() {
        let f = fixture(Duration::from_secs(5));
        let (stream, _rx) = WriteStream::channel();

        assert!(matches!(
            f.group.command("SET x=1", stream).await,
            Err(ProtocolError::Runtime(RuntimeError::GroupNotFound(1)))
        ));
        assert!(f.group.state_machine().streams().is_empty());
    }
}
