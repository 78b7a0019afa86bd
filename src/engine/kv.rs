//! Key/value execution engine
//!
//! A small text protocol used by the node binary and the tests:
//!
//! | payload     | kind    | response                         |
//! |-------------|---------|----------------------------------|
//! | `SET k=v`   | command | `OK`                             |
//! | `DEL k`     | command | `OK` or `NOT_FOUND`              |
//! | `GET k`     | query   | the value or `NOT_FOUND`         |
//! | `KEYS`      | query   | comma-separated keys, sorted     |

use super::{EngineContext, EngineError, EngineFactory, ExecutionEngine, WriteStream};
use crate::cluster::PartitionId;
use std::collections::BTreeMap;
use std::io::{Read, Write};

pub const OK: &str = "OK";
pub const NOT_FOUND: &str = "NOT_FOUND";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KvCommand {
    Set { key: String, value: String },
    Delete { key: String },
}

impl KvCommand {
    pub fn parse(payload: &[u8]) -> Result<Self, EngineError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| EngineError::InvalidCommand(e.to_string()))?;
        let (verb, rest) = split_verb(text);

        match verb {
            "SET" => match rest.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok(KvCommand::Set {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(EngineError::InvalidCommand(format!("expected SET key=value, got '{}'", text))),
            },
            "DEL" if !rest.is_empty() => Ok(KvCommand::Delete { key: rest.to_string() }),
            _ => Err(EngineError::InvalidCommand(format!("unknown command '{}'", text))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KvQuery {
    Get { key: String },
    Keys,
}

impl KvQuery {
    pub fn parse(payload: &[u8]) -> Result<Self, EngineError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| EngineError::InvalidQuery(e.to_string()))?;
        match split_verb(text) {
            ("GET", key) if !key.is_empty() => Ok(KvQuery::Get { key: key.to_string() }),
            ("KEYS", "") => Ok(KvQuery::Keys),
            _ => Err(EngineError::InvalidQuery(format!("unknown query '{}'", text))),
        }
    }
}

fn split_verb(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.split_once(' ') {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (text, ""),
    }
}

/// Ordered in-memory key/value store for one partition.
#[derive(Debug)]
pub struct KvEngine {
    partition: PartitionId,
    store: BTreeMap<String, String>,
}

impl KvEngine {
    pub fn new(partition: PartitionId) -> Self {
        Self {
            partition,
            store: BTreeMap::new(),
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.store.get(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl ExecutionEngine for KvEngine {
    fn command(&mut self, payload: &[u8], stream: WriteStream) {
        match KvCommand::parse(payload) {
            Ok(KvCommand::Set { key, value }) => {
                self.store.insert(key, value);
                stream.value(OK);
            }
            Ok(KvCommand::Delete { key }) => {
                let response = if self.store.remove(&key).is_some() { OK } else { NOT_FOUND };
                stream.value(response);
            }
            Err(e) => {
                stream.error(e);
            }
        }
    }

    fn query(&mut self, payload: &[u8], stream: WriteStream) {
        match KvQuery::parse(payload) {
            Ok(KvQuery::Get { key }) => match self.store.get(&key) {
                Some(value) => stream.value(value.clone()),
                None => stream.value(NOT_FOUND),
            },
            Ok(KvQuery::Keys) => {
                let keys: Vec<&str> = self.store.keys().map(String::as_str).collect();
                stream.value(keys.join(","))
            }
            Err(e) => stream.error(e),
        };
    }

    fn snapshot(&self, writer: &mut dyn Write) -> Result<(), EngineError> {
        serde_json::to_writer(writer, &self.store).map_err(|e| EngineError::Snapshot(e.to_string()))
    }

    fn install(&mut self, reader: &mut dyn Read) -> Result<(), EngineError> {
        self.store = serde_json::from_reader(reader).map_err(|e| EngineError::Install(e.to_string()))?;
        Ok(())
    }
}

/// Creates a fresh [`KvEngine`] for every partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct KvEngineFactory;

impl EngineFactory for KvEngineFactory {
    fn create(&self, context: EngineContext) -> Box<dyn ExecutionEngine> {
        Box::new(KvEngine::new(context.partition))
    }
}
