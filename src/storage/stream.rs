//! Stream routing
//!
//! Correlates an outstanding local command with the entry that carries it
//! through the log. The caller registers its response sink under a fresh
//! stream ID, the ID travels inside the entry, and the state machine takes the
//! sink back out when the entry is applied. Entries replayed on other replicas
//! or after a restart find nothing and their responses are dropped.

use crate::engine::WriteStream;
use crate::error::ProtocolError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies one in-flight command
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A random, process-unique ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of response sinks keyed by stream ID
#[derive(Debug, Default)]
pub struct StreamRouter {
    streams: Mutex<HashMap<StreamId, WriteStream>>,
}

impl StreamRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `stream` under `id`. An ID can only be registered once until
    /// it is looked up or unregistered.
    pub fn register(&self, id: StreamId, stream: WriteStream) -> Result<(), ProtocolError> {
        let mut streams = self.streams.lock();
        if streams.contains_key(&id) {
            return Err(ProtocolError::DuplicateStream(id));
        }
        streams.insert(id, stream);
        Ok(())
    }

    /// Take the sink registered under `id`. Unknown and already consumed IDs
    /// return `None`.
    pub fn lookup(&self, id: &StreamId) -> Option<WriteStream> {
        self.streams.lock().remove(id)
    }

    /// Drop the registration of an abandoned call.
    pub fn unregister(&self, id: &StreamId) -> bool {
        self.streams.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_lookup_delivers_once() {
        let router = StreamRouter::new();
        let (stream, mut rx) = WriteStream::channel();
        let id = StreamId::new("s1");
        router.register(id.clone(), stream).unwrap();
        assert_eq!(router.len(), 1);

        let sink = router.lookup(&id).expect("stream should be registered");
        assert!(sink.value("OK"));
        assert_eq!(rx.recv().await, Some(Ok(Bytes::from("OK"))));

        assert!(router.lookup(&id).is_none());
        assert!(router.is_empty());
    }

    #[test]
    fn test_unknown_stream_is_absent() {
        let router = StreamRouter::new();
        assert!(router.lookup(&StreamId::new("missing")).is_none());
        assert!(!router.unregister(&StreamId::new("missing")));
    }

    #[test]
    fn test_duplicate_registration() {
        let router = StreamRouter::new();
        let id = StreamId::new("s1");
        router.register(id.clone(), WriteStream::discard()).unwrap();

        assert!(matches!(
            router.register(id.clone(), WriteStream::discard()),
            Err(ProtocolError::DuplicateStream(dup)) if dup == id
        ));

        assert!(router.unregister(&id));
        router.register(id, WriteStream::discard()).unwrap();
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = StreamId::generate();
        let b = StreamId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }
}
