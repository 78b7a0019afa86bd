//! Error types for the consensus runtime

use super::state_machine::ApplyError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Peer node not found in registry
    #[error("peer node {node_id} not found in registry")]
    PeerNotFound { node_id: u64 },

    /// No server is listening at the address
    #[error("no server registered at {address}")]
    AddressNotFound { address: String },

    #[error("failed to send message to {address}: {reason}")]
    SendFailed { address: String, reason: String },

    /// The receiving side could not route the message
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Errors that can occur during message routing
#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    /// Group not found in router
    #[error("group {group_id} not found in router")]
    GroupNotFound { group_id: u64 },

    /// Mailbox full (backpressure)
    #[error("mailbox full for group {group_id}")]
    MailboxFull { group_id: u64 },

    #[error("mailbox closed for group {group_id}")]
    MailboxClosed { group_id: u64 },
}

/// Errors surfaced by the consensus runtime to its callers
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("data directory {path} is unusable: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("node host metadata at {path} is invalid: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The data directory was initialised by a node with another raft address
    #[error("data directory {path} belongs to raft address {expected}, not {actual}")]
    AddressMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("log storage for group {group_id} at {path} is unusable: {source}")]
    GroupStorage {
        group_id: u64,
        path: PathBuf,
        #[source]
        source: raft::Error,
    },

    #[error("failed to bind raft address {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("group {0} is already started")]
    GroupAlreadyStarted(u64),

    #[error("group {0} not found")]
    GroupNotFound(u64),

    #[error("group {0} stopped")]
    GroupStopped(u64),

    #[error("proposal to group {group_id} dropped: {reason}")]
    ProposalDropped { group_id: u64, reason: String },

    #[error("raft error: {0}")]
    Raft(#[from] raft::Error),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("consensus runtime is closed")]
    Closed,
}
