//! Raft event fan-out
//!
//! Receives the consensus runtime's leadership and system callbacks,
//! translates node IDs back to member IDs and republishes them as
//! [`RaftEvent`]s. Each listener is a registry entry with its own unbounded
//! queue and forwarding task: publishing never waits, and a slow listener
//! only grows its own queue.

use super::identity::MemberIdentities;
use crate::cluster::{MemberId, NodeId, PartitionId};
use crate::raft::{LeaderInfo, RaftEventListener, SystemEventListener};
use parking_lot::Mutex;
use slog::{debug, Logger};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the sink the coordinator hands to its startup listener.
pub const EVENT_BUFFER: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RaftEvent {
    /// Leadership observed by the local replica; `leader` is `None` while no
    /// leader is known.
    LeaderUpdated {
        partition: PartitionId,
        term: u64,
        leader: Option<MemberId>,
    },
    MembershipChanged {
        partition: PartitionId,
        member: Option<MemberId>,
    },
    SnapshotRecovered {
        partition: PartitionId,
        index: u64,
    },
    NodeReady {
        partition: PartitionId,
        member: Option<MemberId>,
    },
}

impl RaftEvent {
    pub fn partition(&self) -> PartitionId {
        match self {
            RaftEvent::LeaderUpdated { partition, .. }
            | RaftEvent::MembershipChanged { partition, .. }
            | RaftEvent::SnapshotRecovered { partition, .. }
            | RaftEvent::NodeReady { partition, .. } => *partition,
        }
    }
}

struct Listener {
    cancel: CancellationToken,
    queue: mpsc::UnboundedSender<RaftEvent>,
}

impl Listener {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.queue.is_closed()
    }
}

pub struct EventFanout {
    identities: Arc<MemberIdentities>,
    listeners: Mutex<Vec<Listener>>,
    logger: Logger,
}

impl EventFanout {
    pub fn new(identities: Arc<MemberIdentities>, logger: Logger) -> Self {
        Self {
            identities,
            listeners: Mutex::new(Vec::new()),
            logger,
        }
    }

    /// Forward every event published from now on into `sink` until `cancel`
    /// fires or the sink is dropped.
    ///
    /// The listener is registered before this returns, so events published
    /// right after the call are queued for it.
    pub fn listen(&self, cancel: CancellationToken, sink: mpsc::Sender<RaftEvent>) -> JoinHandle<()> {
        let (queue, mut rx) = mpsc::unbounded_channel();
        self.listeners.lock().push(Listener {
            cancel: cancel.clone(),
            queue,
        });

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => event,
                };
                let Some(event) = event else { break };

                let sent = tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = sink.send(event) => sent,
                };
                if sent.is_err() {
                    break;
                }
            }
        })
    }

    /// Queue `event` for every live listener. Returns the number reached.
    pub fn publish(&self, event: RaftEvent) -> usize {
        debug!(self.logger, "Raft event"; "event" => ?event);
        let mut listeners = self.listeners.lock();
        listeners.retain(|listener| listener.is_live() && listener.queue.send(event.clone()).is_ok());
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(Listener::is_live);
        listeners.len()
    }

    fn member(&self, node_id: NodeId) -> Option<MemberId> {
        self.identities.member_id(node_id).cloned()
    }
}

impl RaftEventListener for EventFanout {
    fn leader_updated(&self, info: LeaderInfo) {
        self.publish(RaftEvent::LeaderUpdated {
            partition: PartitionId(info.group_id),
            term: info.term,
            leader: self.member(info.leader_id),
        });
    }
}

impl SystemEventListener for EventFanout {
    fn node_ready(&self, group_id: u64, node_id: NodeId) {
        self.publish(RaftEvent::NodeReady {
            partition: PartitionId(group_id),
            member: self.member(node_id),
        });
    }

    fn membership_changed(&self, group_id: u64, node_id: NodeId) {
        self.publish(RaftEvent::MembershipChanged {
            partition: PartitionId(group_id),
            member: self.member(node_id),
        });
    }

    fn snapshot_recovered(&self, group_id: u64, _node_id: NodeId, index: u64) {
        self.publish(RaftEvent::SnapshotRecovered {
            partition: PartitionId(group_id),
            index,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Replica, RAFT_PORT};
    use crate::raft::test_support::test_logger;
    use std::time::Duration;

    fn fanout() -> EventFanout {
        let replicas = ["a", "b", "c"]
            .iter()
            .map(|id| Replica::new(*id, *id).with_port(RAFT_PORT, 5679))
            .collect();
        let identities = MemberIdentities::from_replicas(&"a".into(), replicas).unwrap();
        EventFanout::new(Arc::new(identities), test_logger())
    }

    fn leader(group_id: u64, term: u64, leader_id: u64) -> LeaderInfo {
        LeaderInfo {
            group_id,
            node_id: 1,
            term,
            leader_id,
        }
    }

    #[tokio::test]
    async fn test_every_listener_receives_every_event() {
        let fanout = fanout();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let token = CancellationToken::new();
        fanout.listen(token.clone(), tx1);
        fanout.listen(token.clone(), tx2);

        fanout.leader_updated(leader(1, 2, 3));
        fanout.snapshot_recovered(1, 1, 40);

        let expected = vec![
            RaftEvent::LeaderUpdated {
                partition: PartitionId(1),
                term: 2,
                leader: Some("c".into()),
            },
            RaftEvent::SnapshotRecovered {
                partition: PartitionId(1),
                index: 40,
            },
        ];
        for rx in [&mut rx1, &mut rx2] {
            for event in &expected {
                assert_eq!(rx.recv().await.as_ref(), Some(event));
            }
        }
        token.cancel();
    }

    #[tokio::test]
    async fn test_unknown_leader_maps_to_none() {
        let fanout = fanout();
        let (tx, mut rx) = mpsc::channel(8);
        fanout.listen(CancellationToken::new(), tx);

        fanout.leader_updated(leader(2, 1, 0));
        fanout.node_ready(2, 2);

        assert_eq!(
            rx.recv().await,
            Some(RaftEvent::LeaderUpdated {
                partition: PartitionId(2),
                term: 1,
                leader: None,
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(RaftEvent::NodeReady {
                partition: PartitionId(2),
                member: Some("b".into()),
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_listener_stops_receiving() {
        let fanout = fanout();
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let task = fanout.listen(token.clone(), tx);

        token.cancel();
        task.await.unwrap();
        assert_eq!(fanout.listener_count(), 0);

        fanout.leader_updated(leader(1, 1, 1));
        // The forwarder owned the only sender, so the sink reports closed.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_slow_listener_does_not_block_others() {
        let fanout = fanout();
        let token = CancellationToken::new();

        // Never drained: its forwarder blocks on the full sink while its
        // queue keeps growing.
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        fanout.listen(token.clone(), slow_tx);

        let (fast_tx, mut fast_rx) = mpsc::channel(64);
        fanout.listen(token.clone(), fast_tx);

        for term in 1..=20 {
            fanout.leader_updated(leader(1, term, 1));
        }

        for term in 1..=20 {
            let event = tokio::time::timeout(Duration::from_secs(1), fast_rx.recv())
                .await
                .expect("fast listener should not be blocked");
            assert!(matches!(event, Some(RaftEvent::LeaderUpdated { term: t, .. }) if t == term));
        }
        token.cancel();
    }

    #[test]
    fn test_publish_without_listeners() {
        let fanout = fanout();
        let event = RaftEvent::SnapshotRecovered {
            partition: PartitionId(1),
            index: 1,
        };
        assert_eq!(fanout.publish(event), 0);
    }

    #[tokio::test]
    async fn test_burst_is_buffered_per_listener() {
        let fanout = fanout();
        let (tx, mut rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        fanout.listen(token.clone(), tx);

        // Far more events than the sink holds, published without yielding.
        for group_id in 1..=5000 {
            let event = RaftEvent::SnapshotRecovered {
                partition: PartitionId(group_id),
                index: group_id,
            };
            assert_eq!(fanout.publish(event), 1);
        }

        for group_id in 1..=5000 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.partition(), PartitionId(group_id));
        }
        token.cancel();
    }
}
