pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod raft;
pub mod storage;

pub use cluster::{Cluster, ClusterConfig, MemberId, PartitionId, Replica, StaticCluster};
pub use config::ProtocolConfig;
pub use engine::{EngineFactory, ExecutionEngine, KvEngine, KvEngineFactory, WriteStream};
pub use error::{ConfigError, ProtocolError};
pub use raft::{InProcessLauncher, InProcessServer, NodeHost, NodeHostConfig, TcpLauncher};
pub use storage::{PartitionGroup, Protocol, ProtocolState, RaftEvent};
