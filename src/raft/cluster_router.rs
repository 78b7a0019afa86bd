//! Group router
//!
//! Dispatches incoming consensus messages to the mailbox of the group they
//! are addressed to. Every server flavour (TCP, in-process) feeds the same
//! router.

use super::errors::RoutingError;
use super::message::GenericMessage;
use super::node::GroupCommand;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Routes incoming messages to the group driver owning `group_id`
///
/// Routing never blocks: a full mailbox drops the message and raft-rs
/// retransmits on its own schedule.
pub struct ClusterRouter {
    routes: RwLock<HashMap<u64, mpsc::Sender<GroupCommand>>>,
}

impl ClusterRouter {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Register a group's mailbox with the router
    pub fn register_group(&self, group_id: u64, sender: mpsc::Sender<GroupCommand>) {
        self.routes.write().insert(group_id, sender);
    }

    /// Unregister a group from the router
    pub fn unregister_group(&self, group_id: u64) {
        self.routes.write().remove(&group_id);
    }

    /// Route a message to the group named in its envelope.
    pub fn route_message(&self, message: GenericMessage) -> Result<(), RoutingError> {
        let group_id = message.group_id;
        let sender = self
            .routes
            .read()
            .get(&group_id)
            .cloned()
            .ok_or(RoutingError::GroupNotFound { group_id })?;

        sender
            .try_send(GroupCommand::Peer(message))
            .map_err(|e| match e {
                TrySendError::Full(_) => RoutingError::MailboxFull { group_id },
                TrySendError::Closed(_) => RoutingError::MailboxClosed { group_id },
            })
    }

    pub fn group_count(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_group_registered(&self, group_id: u64) -> bool {
        self.routes.read().contains_key(&group_id)
    }
}

impl Default for ClusterRouter {
    fn default() -> Self {
        Self::new()
    }
}
