//! Protocol-agnostic transport layer
//!
//! Keeps the node ID to address registry shared by every group on this host
//! and hands framed messages to a protocol-specific [`MessageSender`] (TCP in
//! production, in-process in tests).

use super::errors::TransportError;
use super::message::GenericMessage;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Protocol-specific message sender
///
/// Implemented by each server flavour to deliver a message to the node
/// listening at `address`.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, address: &str, message: GenericMessage) -> Result<(), TransportError>;
}

/// Addressing layer used by group drivers to reach peer nodes
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to a peer node
    async fn send_message(&self, target_node_id: u64, message: GenericMessage) -> Result<(), TransportError>;

    /// Add or replace a peer in the registry
    fn add_peer(&self, node_id: u64, address: String);

    /// Remove a peer from the registry
    fn remove_peer(&self, node_id: u64);

    /// List all peer node IDs
    fn list_peers(&self) -> Vec<u64>;

    /// Get peer address by node ID
    fn get_peer_address(&self, node_id: u64) -> Option<String>;
}

/// Peer registry backed by a [`MessageSender`]
pub struct TransportLayer {
    peers: RwLock<HashMap<u64, String>>,
    message_sender: Arc<dyn MessageSender>,
}

impl TransportLayer {
    pub fn new(message_sender: Arc<dyn MessageSender>) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            message_sender,
        }
    }
}

#[async_trait]
impl Transport for TransportLayer {
    async fn send_message(&self, target_node_id: u64, message: GenericMessage) -> Result<(), TransportError> {
        let address = self
            .peers
            .read()
            .get(&target_node_id)
            .cloned()
            .ok_or(TransportError::PeerNotFound { node_id: target_node_id })?;

        self.message_sender.send(&address, message).await
    }

    fn add_peer(&self, node_id: u64, address: String) {
        self.peers.write().insert(node_id, address);
    }

    fn remove_peer(&self, node_id: u64) {
        self.peers.write().remove(&node_id);
    }

    fn list_peers(&self) -> Vec<u64> {
        self.peers.read().keys().copied().collect()
    }

    fn get_peer_address(&self, node_id: u64) -> Option<String> {
        self.peers.read().get(&node_id).cloned()
    }
}
