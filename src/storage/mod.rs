//! Partitioned storage layer
//!
//! Maps the cluster's replicas onto consensus node identities, runs one
//! consensus group per partition and routes each command's response back to
//! its caller once the command is applied.

pub mod entry;
pub mod events;
pub mod fsm;
pub mod identity;
pub mod partition;
pub mod protocol;
pub mod stream;

pub use events::{EventFanout, RaftEvent};
pub use fsm::PartitionStateMachine;
pub use identity::MemberIdentities;
pub use partition::{GroupState, PartitionGroup};
pub use protocol::{Protocol, ProtocolState};
pub use stream::{StreamId, StreamRouter};
