//! Durable group log storage
//!
//! Each group keeps its raft state in its own RocksDB instance:
//!
//! **entries**: big-endian log index -> protobuf `Entry`
//!
//! **metadata**:
//! - `node_id` -> owning node, checked on reopen
//! - `hard_state` / `conf_state` -> protobuf
//! - `base` -> index and term of the entry just before the first stored one
//! - `last_index` -> u64
//!
//! **snapshot**: `snapshot` -> latest full snapshot (metadata and state machine data)
//!
//! Everything except the entries is cached in memory; every write is a
//! synced batch.

use parking_lot::RwLock;
use protobuf::Message as ProtobufMessage;
use raft::prelude::*;
use raft::util::limit_size;
use raft::GetEntriesContext;
use raft::{Error, Result, StorageError};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, WriteOptions, DB};
use std::path::Path;
use std::sync::Arc;

const CF_ENTRIES: &str = "entries";
const CF_METADATA: &str = "metadata";
const CF_SNAPSHOT: &str = "snapshot";

const KEY_NODE_ID: &[u8] = b"node_id";
const KEY_HARD_STATE: &[u8] = b"hard_state";
const KEY_CONF_STATE: &[u8] = b"conf_state";
const KEY_BASE: &[u8] = b"base";
const KEY_LAST_INDEX: &[u8] = b"last_index";
const KEY_SNAPSHOT: &[u8] = b"snapshot";

fn store_error<E>(e: E) -> Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Error::Store(StorageError::Other(e.into()))
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .map_err(|_| store_error("corrupt integer in group storage"))
}

fn encode_base(index: u64, term: u64) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&index.to_be_bytes());
    buf[8..].copy_from_slice(&term.to_be_bytes());
    buf
}

fn decode_base(bytes: &[u8]) -> Result<(u64, u64)> {
    if bytes.len() != 16 {
        return Err(store_error("corrupt log base in group storage"));
    }
    Ok((decode_u64(&bytes[..8])?, decode_u64(&bytes[8..])?))
}

#[derive(Default)]
struct LogState {
    hard_state: HardState,
    conf_state: ConfState,
    /// (index, term) of the entry preceding the first stored entry
    base: (u64, u64),
    last_index: u64,
    snapshot: Option<Snapshot>,
}

/// RocksDB-backed `raft::Storage` for one group. Clones share the database.
#[derive(Clone)]
pub struct GroupStorage {
    db: Arc<DB>,
    state: Arc<RwLock<LogState>>,
    restored: bool,
}

impl GroupStorage {
    /// Open the storage at `path`, creating it with `conf_state` as the
    /// initial voters if it does not exist yet. An existing store must belong
    /// to `node_id`; its persisted state wins over `conf_state`.
    pub fn open(path: impl AsRef<Path>, node_id: u64, conf_state: ConfState) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let families = [CF_ENTRIES, CF_METADATA, CF_SNAPSHOT]
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&options, path.as_ref(), families).map_err(store_error)?;

        let mut storage = Self {
            db: Arc::new(db),
            state: Arc::new(RwLock::new(LogState::default())),
            restored: false,
        };

        match storage.get(CF_METADATA, KEY_NODE_ID)? {
            Some(bytes) => {
                let stored = decode_u64(&bytes)?;
                if stored != node_id {
                    return Err(store_error(format!(
                        "group storage belongs to node {}, not {}",
                        stored, node_id
                    )));
                }
                storage.load()?;
                storage.restored = true;
            }
            None => storage.initialize(node_id, conf_state)?,
        }
        Ok(storage)
    }

    /// Whether `open` found state from a previous run.
    pub fn is_restored(&self) -> bool {
        self.restored
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or(Error::Store(StorageError::Unavailable))
    }

    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get_cf(self.cf(cf)?, key).map_err(store_error)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut options = WriteOptions::default();
        options.set_sync(true);
        self.db.write_opt(batch, &options).map_err(store_error)
    }

    fn initialize(&self, node_id: u64, conf_state: ConfState) -> Result<()> {
        let metadata = self.cf(CF_METADATA)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(metadata, KEY_HARD_STATE, HardState::default().write_to_bytes()?);
        batch.put_cf(metadata, KEY_CONF_STATE, conf_state.write_to_bytes()?);
        batch.put_cf(metadata, KEY_BASE, encode_base(0, 0));
        batch.put_cf(metadata, KEY_LAST_INDEX, 0u64.to_be_bytes());
        batch.put_cf(metadata, KEY_NODE_ID, node_id.to_be_bytes());
        self.write(batch)?;

        self.state.write().conf_state = conf_state;
        Ok(())
    }

    fn load(&self) -> Result<()> {
        let hard_state = match self.get(CF_METADATA, KEY_HARD_STATE)? {
            Some(bytes) => HardState::parse_from_bytes(&bytes)?,
            None => HardState::default(),
        };
        let conf_state = match self.get(CF_METADATA, KEY_CONF_STATE)? {
            Some(bytes) => ConfState::parse_from_bytes(&bytes)?,
            None => ConfState::default(),
        };
        let base = match self.get(CF_METADATA, KEY_BASE)? {
            Some(bytes) => decode_base(&bytes)?,
            None => (0, 0),
        };
        let last_index = match self.get(CF_METADATA, KEY_LAST_INDEX)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => base.0,
        };
        let snapshot = match self.get(CF_SNAPSHOT, KEY_SNAPSHOT)? {
            Some(bytes) => Some(Snapshot::parse_from_bytes(&bytes)?),
            None => None,
        };

        *self.state.write() = LogState {
            hard_state,
            conf_state,
            base,
            last_index,
            snapshot,
        };
        Ok(())
    }

    fn load_entry(&self, index: u64) -> Result<Entry> {
        match self.get(CF_ENTRIES, &index.to_be_bytes())? {
            Some(bytes) => Ok(Entry::parse_from_bytes(&bytes)?),
            None => Err(Error::Store(StorageError::Unavailable)),
        }
    }

    /// Append `entries`, replacing any stored entries from the first new index on.
    pub fn append(&self, entries: &[Entry]) -> Result<()> {
        let Some(first) = entries.first().map(|entry| entry.index) else {
            return Ok(());
        };
        let last = first + entries.len() as u64 - 1;

        let mut state = self.state.write();
        if first <= state.base.0 {
            return Err(Error::Store(StorageError::Compacted));
        }
        if first > state.last_index + 1 {
            return Err(store_error(format!(
                "appending at {} leaves a gap after {}",
                first, state.last_index
            )));
        }

        let cf_entries = self.cf(CF_ENTRIES)?;
        let mut batch = WriteBatch::default();
        if first <= state.last_index {
            batch.delete_range_cf(cf_entries, first.to_be_bytes(), (state.last_index + 1).to_be_bytes());
        }
        for entry in entries {
            batch.put_cf(cf_entries, entry.index.to_be_bytes(), entry.write_to_bytes()?);
        }
        batch.put_cf(self.cf(CF_METADATA)?, KEY_LAST_INDEX, last.to_be_bytes());
        self.write(batch)?;

        state.last_index = last;
        Ok(())
    }

    pub fn set_hard_state(&self, hard_state: &HardState) -> Result<()> {
        let mut state = self.state.write();
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_METADATA)?, KEY_HARD_STATE, hard_state.write_to_bytes()?);
        self.write(batch)?;
        state.hard_state = hard_state.clone();
        Ok(())
    }

    pub fn set_commit(&self, commit: u64) -> Result<()> {
        let mut hard_state = self.state.read().hard_state.clone();
        hard_state.set_commit(commit);
        self.set_hard_state(&hard_state)
    }

    pub fn set_conf_state(&self, conf_state: ConfState) -> Result<()> {
        let mut state = self.state.write();
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_METADATA)?, KEY_CONF_STATE, conf_state.write_to_bytes()?);
        self.write(batch)?;
        state.conf_state = conf_state;
        Ok(())
    }

    pub fn hard_state(&self) -> HardState {
        self.state.read().hard_state.clone()
    }

    /// Discard every entry before `compact_index`.
    pub fn compact(&self, compact_index: u64) -> Result<()> {
        let mut state = self.state.write();
        let first = state.base.0 + 1;
        if compact_index <= first {
            return Ok(());
        }
        if compact_index > state.last_index + 1 {
            return Err(store_error(format!(
                "cannot compact to {} past last index {}",
                compact_index, state.last_index
            )));
        }

        let base = (compact_index - 1, self.load_entry(compact_index - 1)?.term);
        let mut batch = WriteBatch::default();
        batch.delete_range_cf(self.cf(CF_ENTRIES)?, first.to_be_bytes(), compact_index.to_be_bytes());
        batch.put_cf(self.cf(CF_METADATA)?, KEY_BASE, encode_base(base.0, base.1));
        self.write(batch)?;

        state.base = base;
        Ok(())
    }

    /// Record a snapshot taken locally at `index`/`term`. The log is left as is.
    pub fn save_snapshot(&self, index: u64, term: u64, conf_state: ConfState, data: Vec<u8>) -> Result<()> {
        let mut snapshot = Snapshot::default();
        snapshot.set_data(data.into());
        let meta = snapshot.mut_metadata();
        meta.index = index;
        meta.term = term;
        meta.set_conf_state(conf_state);

        let mut state = self.state.write();
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_SNAPSHOT)?, KEY_SNAPSHOT, snapshot.write_to_bytes()?);
        self.write(batch)?;
        state.snapshot = Some(snapshot);
        Ok(())
    }

    /// Install a snapshot received from the leader, replacing the whole log.
    pub fn apply_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let meta = snapshot.get_metadata();
        let (index, term) = (meta.index, meta.term);
        let conf_state = meta.get_conf_state().clone();

        let mut state = self.state.write();
        if index <= state.base.0 {
            return Err(Error::Store(StorageError::SnapshotOutOfDate));
        }

        let mut hard_state = state.hard_state.clone();
        hard_state.term = hard_state.term.max(term);
        hard_state.commit = index;

        let metadata = self.cf(CF_METADATA)?;
        let mut batch = WriteBatch::default();
        batch.delete_range_cf(
            self.cf(CF_ENTRIES)?,
            (state.base.0 + 1).to_be_bytes(),
            (state.last_index.max(index) + 1).to_be_bytes(),
        );
        batch.put_cf(metadata, KEY_BASE, encode_base(index, term));
        batch.put_cf(metadata, KEY_LAST_INDEX, index.to_be_bytes());
        batch.put_cf(metadata, KEY_HARD_STATE, hard_state.write_to_bytes()?);
        batch.put_cf(metadata, KEY_CONF_STATE, conf_state.write_to_bytes()?);
        batch.put_cf(self.cf(CF_SNAPSHOT)?, KEY_SNAPSHOT, snapshot.write_to_bytes()?);
        self.write(batch)?;

        *state = LogState {
            hard_state,
            conf_state,
            base: (index, term),
            last_index: index,
            snapshot: Some(snapshot),
        };
        Ok(())
    }

    /// The latest snapshot, local or received.
    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.state.read().snapshot.clone()
    }

    /// Index of the latest snapshot, zero if none.
    pub fn snapshot_index(&self) -> u64 {
        self.state
            .read()
            .snapshot
            .as_ref()
            .map_or(0, |snapshot| snapshot.get_metadata().index)
    }
}

impl Storage for GroupStorage {
    fn initial_state(&self) -> Result<RaftState> {
        let state = self.state.read();
        Ok(RaftState::new(state.hard_state.clone(), state.conf_state.clone()))
    }

    fn entries(
        &self,
        low: u64,
        high: u64,
        max_size: impl Into<Option<u64>>,
        _context: GetEntriesContext,
    ) -> Result<Vec<Entry>> {
        let max_size = max_size.into();
        let state = self.state.read();
        if low <= state.base.0 {
            return Err(Error::Store(StorageError::Compacted));
        }
        if high > state.last_index + 1 {
            return Err(Error::Store(StorageError::Unavailable));
        }

        let mut entries = Vec::new();
        let mut size = 0u64;
        for index in low..high {
            let entry = self.load_entry(index)?;
            size += u64::from(entry.compute_size());
            entries.push(entry);
            if max_size.is_some_and(|max| size > max) {
                break;
            }
        }
        limit_size(&mut entries, max_size);
        Ok(entries)
    }

    fn term(&self, idx: u64) -> Result<u64> {
        let state = self.state.read();
        if idx == state.base.0 {
            return Ok(state.base.1);
        }
        if idx < state.base.0 {
            return Err(Error::Store(StorageError::Compacted));
        }
        if idx > state.last_index {
            return Err(Error::Store(StorageError::Unavailable));
        }
        Ok(self.load_entry(idx)?.term)
    }

    fn first_index(&self) -> Result<u64> {
        Ok(self.state.read().base.0 + 1)
    }

    fn last_index(&self) -> Result<u64> {
        Ok(self.state.read().last_index)
    }

    fn snapshot(&self, request_index: u64, _to: u64) -> Result<Snapshot> {
        match self.state.read().snapshot.as_ref() {
            Some(snapshot) if snapshot.get_metadata().index >= request_index => Ok(snapshot.clone()),
            _ => Err(Error::Store(StorageError::SnapshotTemporarilyUnavailable)),
        }
    }
}
