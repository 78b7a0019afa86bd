//! In-process server for testing
//!
//! Routes messages between node hosts living in the same process without any
//! network I/O. Hosts register under their raft address, so the same
//! `host:port` strings used in production work unchanged in tests.

use crate::raft::errors::TransportError;
use crate::raft::message::GenericMessage;
use crate::raft::transport::MessageSender;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type ReceiveCallback = Arc<dyn Fn(GenericMessage) -> Result<(), TransportError> + Send + Sync>;

/// In-memory switchboard keyed by raft address
pub struct InProcessServer {
    nodes: RwLock<HashMap<String, ReceiveCallback>>,
}

impl InProcessServer {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Register the receive callback for a node host
    pub fn register<F>(&self, address: impl Into<String>, callback: F)
    where
        F: Fn(GenericMessage) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        self.nodes.write().insert(address.into(), Arc::new(callback));
    }

    pub fn unregister(&self, address: &str) {
        self.nodes.write().remove(address);
    }

    /// Deliver a message to the host registered at `address`
    pub fn send_to(&self, address: &str, message: GenericMessage) -> Result<(), TransportError> {
        let callback = self.nodes.read().get(address).cloned();
        match callback {
            Some(callback) => callback(message),
            None => Err(TransportError::AddressNotFound {
                address: address.to_string(),
            }),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }
}

impl Default for InProcessServer {
    fn default() -> Self {
        Self::new()
    }
}

/// [`MessageSender`] delivering through an [`InProcessServer`]
pub struct InProcessMessageSender {
    server: Arc<InProcessServer>,
}

impl InProcessMessageSender {
    pub fn new(server: Arc<InProcessServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl MessageSender for InProcessMessageSender {
    async fn send(&self, address: &str, message: GenericMessage) -> Result<(), TransportError> {
        self.server.send_to(address, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_in_process_server_register_unregister() {
        let server = InProcessServer::new();
        server.register("a:5679", |_msg| Ok(()));
        server.register("b:5679", |_msg| Ok(()));
        assert_eq!(server.node_count(), 2);

        server.unregister("a:5679");
        assert_eq!(server.node_count(), 1);
    }

    #[tokio::test]
    async fn test_in_process_message_sender_send() {
        let server = Arc::new(InProcessServer::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        server.register("b:5679", move |msg| {
            received_clone.lock().push(msg);
            Ok(())
        });

        let sender = InProcessMessageSender::new(server);
        sender.send("b:5679", GenericMessage::new(10, vec![7])).await.unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].group_id, 10);
    }

    #[tokio::test]
    async fn test_in_process_send_to_unknown_address() {
        let sender = InProcessMessageSender::new(Arc::new(InProcessServer::new()));
        match sender.send("nowhere:1", GenericMessage::new(1, vec![])).await {
            Err(TransportError::AddressNotFound { address }) => assert_eq!(address, "nowhere:1"),
            other => panic!("Expected AddressNotFound error, got {:?}", other),
        }
    }
}
