//! Error types for configuration loading and the protocol coordinator

use crate::cluster::{MemberId, PartitionId};
use crate::engine::EngineError;
use crate::raft::errors::RuntimeError;
use crate::storage::stream::StreamId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating the node's configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The local member is not part of the configured replica set
    #[error("local member {member_id} is not in the replica set")]
    LocalMemberMissing { member_id: String },

    #[error("replica {member_id} does not expose a '{port}' port")]
    MissingPort { member_id: MemberId, port: String },

    #[error("replica {0} is listed more than once")]
    DuplicateMember(MemberId),
}

/// Errors surfaced by the protocol coordinator and partition groups
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("consensus runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("failed to start partition {partition}: {source}")]
    GroupStart {
        partition: PartitionId,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to stop partition {partition}: {source}")]
    GroupStop {
        partition: PartitionId,
        #[source]
        source: RuntimeError,
    },

    #[error("no leader reported within {timeout:?} for partitions {pending:?}")]
    StartupTimeout {
        timeout: Duration,
        pending: Vec<PartitionId>,
    },

    #[error("protocol already started")]
    AlreadyStarted,

    #[error("protocol not started")]
    NotStarted,

    #[error("partition {0} not found")]
    PartitionNotFound(PartitionId),

    #[error("stream {0} is already registered")]
    DuplicateStream(StreamId),

    #[error("proposal to partition {partition} timed out after {timeout:?}")]
    ProposalTimeout {
        partition: PartitionId,
        timeout: Duration,
    },

    #[error("response stream closed before a result was delivered")]
    StreamClosed,

    #[error(transparent)]
    Engine(#[from] EngineError),
}
