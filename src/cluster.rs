//! Cluster membership model
//!
//! Replicas, partitions and the `Cluster` membership provider consumed by the
//! protocol coordinator. The topology is supplied to the node process as a JSON
//! document (`cluster.json`) written by the orchestration controller.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Well-known port name used for consensus traffic.
pub const RAFT_PORT: &str = "raft";

/// Port name used by clients of the execution engine.
pub const API_PORT: &str = "api";

/// Consensus-runtime node identity (dense, 1-based).
pub type NodeId = u64;

/// Stable external identity of a replica, supplied by the membership provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifies one independent consensus group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub u64);

impl PartitionId {
    /// The consensus group ID backing this partition.
    pub fn group_id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PartitionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A member of the replica set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replica {
    pub id: MemberId,
    pub host: String,
    pub ports: BTreeMap<String, u16>,
}

impl Replica {
    pub fn new(id: impl Into<MemberId>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            ports: BTreeMap::new(),
        }
    }

    /// Add a named port.
    pub fn with_port(mut self, name: impl Into<String>, port: u16) -> Self {
        self.ports.insert(name.into(), port);
        self
    }

    /// Look up a named port.
    pub fn port(&self, name: &str) -> Option<u16> {
        self.ports.get(name).copied()
    }

    /// `host:port` for the named port, if the replica exposes it.
    pub fn address(&self, port_name: &str) -> Option<String> {
        self.port(port_name).map(|port| format!("{}:{}", self.host, port))
    }
}

/// Cluster membership provider
///
/// Supplies the replica set, the local member and the partitions hosted by
/// this cluster. The replica set is immutable for the lifetime of a protocol
/// instance.
pub trait Cluster: Send + Sync {
    /// Identity of the local member.
    fn member_id(&self) -> MemberId;

    /// The local member, if it is part of the configured membership.
    fn member(&self) -> Option<Replica> {
        let id = self.member_id();
        self.replicas().into_iter().find(|replica| replica.id == id)
    }

    /// All replicas, in no particular order.
    fn replicas(&self) -> Vec<Replica>;

    /// Partitions served by this cluster.
    fn partitions(&self) -> Vec<PartitionId>;
}

/// A fixed membership built from the topology document.
#[derive(Clone, Debug)]
pub struct StaticCluster {
    member_id: MemberId,
    replicas: Vec<Replica>,
    partitions: Vec<PartitionId>,
}

impl StaticCluster {
    pub fn new(
        member_id: impl Into<MemberId>,
        replicas: Vec<Replica>,
        partitions: Vec<PartitionId>,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            replicas,
            partitions,
        }
    }

    /// Build the membership for `member_id` from a parsed topology document.
    pub fn from_config(member_id: impl Into<MemberId>, config: ClusterConfig) -> Self {
        let replicas = config.replicas.into_iter().map(Replica::from).collect();
        let partitions = config
            .partitions
            .into_iter()
            .map(|p| PartitionId(p.partition))
            .collect();
        Self::new(member_id, replicas, partitions)
    }
}

impl Cluster for StaticCluster {
    fn member_id(&self) -> MemberId {
        self.member_id.clone()
    }

    fn replicas(&self) -> Vec<Replica> {
        self.replicas.clone()
    }

    fn partitions(&self) -> Vec<PartitionId> {
        self.partitions.clone()
    }
}

/// Replica entry of the topology document
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaConfig {
    pub id: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_port: Option<u16>,
    /// Consensus port, exposed under the well-known `raft` name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_port: Option<u16>,
    /// Any additional named ports.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, u16>,
}

impl From<ReplicaConfig> for Replica {
    fn from(config: ReplicaConfig) -> Self {
        let mut ports = config.ports;
        if let Some(port) = config.api_port {
            ports.insert(API_PORT.to_string(), port);
        }
        if let Some(port) = config.protocol_port {
            ports.insert(RAFT_PORT.to_string(), port);
        }
        Replica {
            id: MemberId(config.id),
            host: config.host,
            ports,
        }
    }
}

/// Partition entry of the topology document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub partition: u64,
}

/// The replica/partition topology document (`cluster.json`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub replicas: Vec<ReplicaConfig>,
    #[serde(default)]
    pub partitions: Vec<PartitionConfig>,
}

impl ClusterConfig {
    /// Parse a topology document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: "<inline>".into(),
            source,
        })
    }

    /// Load a topology document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
