// Log entry carried through each partition's replicated log

use super::stream::StreamId;
use bytes::Bytes;
use prost::Message;

/// A command bound to the stream awaiting its response
#[derive(Clone, PartialEq, prost::Message)]
pub struct Entry {
    #[prost(string, tag = "1")]
    pub stream_id: String,

    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
}

impl Entry {
    pub fn new(stream_id: &StreamId, value: impl Into<Bytes>) -> Self {
        Self {
            stream_id: stream_id.as_str().to_string(),
            value: value.into(),
        }
    }

    pub fn stream(&self) -> StreamId {
        StreamId::new(self.stream_id.clone())
    }

    pub fn encode_to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn decode_from(data: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(data)
    }
}
