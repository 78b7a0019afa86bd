//! State machine contract driven by the consensus runtime
//!
//! The runtime hands every committed entry of a group to its state machine in
//! log order, serves local reads through it, and uses it to produce and
//! install snapshots.

use crate::engine::{EngineError, WriteStream};
use bytes::Bytes;
use std::io::{Read, Write};
use thiserror::Error;

/// Acknowledges the log position an entry was applied at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateResult {
    pub index: u64,
}

/// A local read: the payload plus the stream its response goes to.
#[derive(Clone, Debug)]
pub struct Query {
    pub payload: Bytes,
    pub stream: WriteStream,
}

impl Query {
    pub fn new(payload: impl Into<Bytes>, stream: WriteStream) -> Self {
        Self {
            payload: payload.into(),
            stream,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    /// The entry is not a valid encoded log entry
    #[error("malformed log entry: {0}")]
    MalformedEntry(#[from] prost::DecodeError),

    #[error("state machine is closed")]
    Closed,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Per-group state machine
///
/// All methods may be called from the group driver task while other tasks
/// issue reads, so implementations synchronise internally.
pub trait StateMachine: Send + Sync {
    /// Apply the committed entry at `index`.
    fn update(&self, index: u64, data: &[u8]) -> Result<UpdateResult, ApplyError>;

    /// Serve a read against local state.
    fn lookup(&self, query: Query) -> Result<(), ApplyError>;

    fn save_snapshot(&self, writer: &mut dyn Write) -> Result<(), ApplyError>;

    fn recover_from_snapshot(&self, reader: &mut dyn Read) -> Result<(), ApplyError>;

    /// Release local resources. Idempotent.
    fn close(&self);
}
