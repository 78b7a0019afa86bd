//! Member identity resolution
//!
//! The consensus runtime identifies nodes by dense integers while the
//! membership provider hands out string member IDs in no particular order.
//! Every node sorts the replica set by member ID and numbers it from 1, so all
//! participants agree on the mapping without coordinating.

use crate::cluster::{Cluster, MemberId, NodeId, Replica, RAFT_PORT};
use crate::error::ConfigError;
use std::collections::{BTreeMap, HashMap};

/// Immutable node ID / member ID / raft address mappings for one replica set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberIdentities {
    local: NodeId,
    members: BTreeMap<NodeId, MemberId>,
    nodes: HashMap<MemberId, NodeId>,
    addresses: BTreeMap<NodeId, String>,
}

impl MemberIdentities {
    /// Resolve identities for the cluster's local member.
    pub fn resolve(cluster: &dyn Cluster) -> Result<Self, ConfigError> {
        Self::from_replicas(&cluster.member_id(), cluster.replicas())
    }

    /// Resolve identities for `local` within `replicas`.
    pub fn from_replicas(local: &MemberId, mut replicas: Vec<Replica>) -> Result<Self, ConfigError> {
        replicas.sort_by(|a, b| a.id.cmp(&b.id));

        let mut members = BTreeMap::new();
        let mut nodes = HashMap::new();
        let mut addresses = BTreeMap::new();
        for (position, replica) in replicas.into_iter().enumerate() {
            let node_id = position as NodeId + 1;
            let address = replica.address(RAFT_PORT).ok_or_else(|| ConfigError::MissingPort {
                member_id: replica.id.clone(),
                port: RAFT_PORT.to_string(),
            })?;
            if nodes.insert(replica.id.clone(), node_id).is_some() {
                return Err(ConfigError::DuplicateMember(replica.id));
            }
            members.insert(node_id, replica.id);
            addresses.insert(node_id, address);
        }

        let local = *nodes.get(local).ok_or_else(|| ConfigError::LocalMemberMissing {
            member_id: local.to_string(),
        })?;

        Ok(Self {
            local,
            members,
            nodes,
            addresses,
        })
    }

    pub fn node_id(&self, member: &MemberId) -> Option<NodeId> {
        self.nodes.get(member).copied()
    }

    pub fn member_id(&self, node_id: NodeId) -> Option<&MemberId> {
        self.members.get(&node_id)
    }

    /// Raft address (`host:port`) of a node.
    pub fn address(&self, node_id: NodeId) -> Option<&str> {
        self.addresses.get(&node_id).map(String::as_str)
    }

    /// Raft addresses of every node, ordered by node ID.
    pub fn addresses(&self) -> &BTreeMap<NodeId, String> {
        &self.addresses
    }

    pub fn local_node_id(&self) -> NodeId {
        self.local
    }

    pub fn local_member(&self) -> &MemberId {
        &self.members[&self.local]
    }

    pub fn local_address(&self) -> &str {
        &self.addresses[&self.local]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
