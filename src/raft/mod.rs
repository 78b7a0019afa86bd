//! Multi-group Raft runtime built on raft-rs
//!
//! - `node`: one driver task per group
//! - `node_host`: the per-process host owning every group, the peer registry
//!   and the network server
//! - `transport` / `server`: how consensus messages move between hosts

pub mod cluster_router;
pub mod errors;
pub mod message;
pub mod node;
pub mod node_host;
pub mod runtime;
pub mod server;
pub mod state_machine;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{RoutingError, RuntimeError, TransportError};
pub use node_host::{InProcessLauncher, NodeHost, NodeHostConfig, TcpLauncher};
pub use runtime::{
    ConsensusRuntime, GroupConfig, LeaderInfo, RaftEventListener, RuntimeLauncher, RuntimeListeners,
    SystemEventListener,
};
pub use server::InProcessServer;
pub use state_machine::{ApplyError, Query, StateMachine, UpdateResult};
