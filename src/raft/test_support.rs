//! Shared helpers for unit tests

use super::runtime::{LeaderInfo, RaftEventListener, SystemEventListener};
use super::state_machine::{ApplyError, Query, StateMachine, UpdateResult};
use parking_lot::Mutex;
use slog::{Drain, Logger};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn test_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    Logger::root(std::sync::Mutex::new(drain).fuse(), slog::o!())
}

/// Records applied entries and snapshot traffic
#[derive(Default)]
pub struct RecordingStateMachine {
    pub applied: Mutex<Vec<(u64, Vec<u8>)>>,
    pub recovered: Mutex<Vec<Vec<u8>>>,
    snapshots: AtomicUsize,
    closed: AtomicBool,
}

impl RecordingStateMachine {
    /// Payload the state machine refuses to apply
    pub const REJECT: &'static [u8] = b"reject";

    pub fn snapshots_taken(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl StateMachine for RecordingStateMachine {
    fn update(&self, index: u64, data: &[u8]) -> Result<UpdateResult, ApplyError> {
        if data == Self::REJECT {
            return Err(ApplyError::Closed);
        }
        self.applied.lock().push((index, data.to_vec()));
        Ok(UpdateResult { index })
    }

    fn lookup(&self, query: Query) -> Result<(), ApplyError> {
        let count = self.applied.lock().len();
        query.stream.value(count.to_string());
        Ok(())
    }

    fn save_snapshot(&self, writer: &mut dyn Write) -> Result<(), ApplyError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        let count = self.applied.lock().len();
        let _ = writer.write_all(count.to_string().as_bytes());
        Ok(())
    }

    fn recover_from_snapshot(&self, reader: &mut dyn Read) -> Result<(), ApplyError> {
        let mut data = Vec::new();
        let _ = reader.read_to_end(&mut data);
        self.recovered.lock().push(data);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Records every listener callback
#[derive(Default)]
pub struct RecordingListener {
    pub leaders: Mutex<Vec<LeaderInfo>>,
    pub ready: Mutex<Vec<(u64, u64)>>,
    pub membership: Mutex<Vec<(u64, u64)>>,
    pub recovered: Mutex<Vec<(u64, u64, u64)>>,
}

impl RaftEventListener for RecordingListener {
    fn leader_updated(&self, info: LeaderInfo) {
        self.leaders.lock().push(info);
    }
}

impl SystemEventListener for RecordingListener {
    fn node_ready(&self, group_id: u64, node_id: u64) {
        self.ready.lock().push((group_id, node_id));
    }

    fn membership_changed(&self, group_id: u64, node_id: u64) {
        self.membership.lock().push((group_id, node_id));
    }

    fn snapshot_recovered(&self, group_id: u64, node_id: u64, index: u64) {
        self.recovered.lock().push((group_id, node_id, index));
    }
}
