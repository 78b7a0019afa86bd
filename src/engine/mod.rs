//! Execution engine contract
//!
//! An execution engine is the opaque, deterministic service that interprets
//! command and query payloads for one partition. The storage layer hands it
//! the payload together with a [`WriteStream`] on which the engine writes its
//! response; the engine decides what, if anything, is written.

pub mod kv;

pub use kv::{KvEngine, KvEngineFactory};

use crate::cluster::{PartitionId, Replica};
use bytes::Bytes;
use std::io::{Read, Write};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by execution engines
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("snapshot failed: {0}")]
    Snapshot(String),

    #[error("failed to install snapshot: {0}")]
    Install(String),
}

/// A single response delivered on a [`WriteStream`].
pub type StreamResult = Result<Bytes, EngineError>;

/// Caller-owned response sink
///
/// Writes never block: responses are queued on an unbounded channel owned by
/// the caller. A discarding stream accepts and drops every write, which is what
/// replicas use when applying entries proposed elsewhere.
#[derive(Clone, Debug)]
pub struct WriteStream {
    tx: Option<mpsc::UnboundedSender<StreamResult>>,
}

impl WriteStream {
    /// Create a stream and the receiver its responses arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A stream that drops everything written to it.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn is_discard(&self) -> bool {
        self.tx.is_none()
    }

    /// Write a response value. Returns false if nobody is listening anymore.
    pub fn value(&self, value: impl Into<Bytes>) -> bool {
        self.send(Ok(value.into()))
    }

    /// Write an error response.
    pub fn error(&self, error: EngineError) -> bool {
        self.send(Err(error))
    }

    fn send(&self, result: StreamResult) -> bool {
        match &self.tx {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

/// Deterministic service interpreting one partition's commands and queries
///
/// Calls are serialized by the caller; an engine never sees two calls at once.
pub trait ExecutionEngine: Send {
    /// Apply a committed command. Must be deterministic across replicas.
    fn command(&mut self, payload: &[u8], stream: WriteStream);

    /// Serve a read against local state.
    fn query(&mut self, payload: &[u8], stream: WriteStream);

    /// Serialize the full engine state.
    fn snapshot(&self, writer: &mut dyn Write) -> Result<(), EngineError>;

    /// Replace the engine state with a previously written snapshot.
    fn install(&mut self, reader: &mut dyn Read) -> Result<(), EngineError>;
}

/// What an engine learns about the partition it serves.
#[derive(Clone, Debug)]
pub struct EngineContext {
    pub partition: PartitionId,
    pub replicas: Vec<Replica>,
    pub session_timeout: Duration,
}

/// Creates one engine per partition.
pub trait EngineFactory: Send + Sync {
    fn create(&self, context: EngineContext) -> Box<dyn ExecutionEngine>;
}
