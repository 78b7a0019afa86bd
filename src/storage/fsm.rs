//! Partition state machine
//!
//! Adapts a partition's [`ExecutionEngine`] to the consensus runtime's
//! [`StateMachine`] contract. Every call takes the same per-partition lock,
//! since engines are not required to be thread-safe.
//!
//! A malformed entry is reported as [`ApplyError::MalformedEntry`]. The
//! runtime logs it and moves past the entry, so every replica skips it the
//! same way and the group keeps running.

use super::entry::Entry;
use super::stream::StreamRouter;
use crate::cluster::PartitionId;
use crate::engine::{ExecutionEngine, WriteStream};
use crate::raft::{ApplyError, Query, StateMachine, UpdateResult};
use parking_lot::Mutex;
use slog::{debug, info, Logger};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct PartitionStateMachine {
    partition: PartitionId,
    engine: Mutex<Box<dyn ExecutionEngine>>,
    streams: Arc<StreamRouter>,
    closed: AtomicBool,
    logger: Logger,
}

impl PartitionStateMachine {
    pub fn new(
        partition: PartitionId,
        engine: Box<dyn ExecutionEngine>,
        streams: Arc<StreamRouter>,
        logger: Logger,
    ) -> Self {
        Self {
            partition,
            engine: Mutex::new(engine),
            streams,
            closed: AtomicBool::new(false),
            logger,
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn streams(&self) -> &Arc<StreamRouter> {
        &self.streams
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), ApplyError> {
        if self.is_closed() {
            return Err(ApplyError::Closed);
        }
        Ok(())
    }
}

impl StateMachine for PartitionStateMachine {
    fn update(&self, index: u64, data: &[u8]) -> Result<UpdateResult, ApplyError> {
        self.ensure_open()?;
        let entry = Entry::decode_from(data)?;

        let stream = match self.streams.lookup(&entry.stream()) {
            Some(stream) => stream,
            None => {
                debug!(self.logger, "No stream for entry, response dropped";
                    "index" => index, "stream" => &entry.stream_id);
                WriteStream::discard()
            }
        };

        self.engine.lock().command(&entry.value, stream);
        Ok(UpdateResult { index })
    }

    fn lookup(&self, query: Query) -> Result<(), ApplyError> {
        self.ensure_open()?;
        self.engine.lock().query(&query.payload, query.stream);
        Ok(())
    }

    fn save_snapshot(&self, writer: &mut dyn Write) -> Result<(), ApplyError> {
        self.ensure_open()?;
        self.engine.lock().snapshot(writer)?;
        Ok(())
    }

    fn recover_from_snapshot(&self, reader: &mut dyn Read) -> Result<(), ApplyError> {
        self.ensure_open()?;
        self.engine.lock().install(reader)?;
        info!(self.logger, "Engine state restored from snapshot");
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(self.logger, "State machine closed");
        }
    }
}
