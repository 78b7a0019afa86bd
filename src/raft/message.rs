//! Wire envelope for consensus traffic
//!
//! Every raft-rs message crossing the network is wrapped with the ID of the
//! group it belongs to so the receiving node can dispatch it to the right
//! group mailbox.

use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;

/// Largest frame accepted from the network.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Clone, PartialEq, prost::Message)]
pub struct GenericMessage {
    #[prost(uint64, tag = "1")]
    pub group_id: u64,
    /// protobuf-encoded `raft::prelude::Message`
    #[prost(bytes = "vec", tag = "2")]
    pub raft_message: Vec<u8>,
}

impl GenericMessage {
    pub fn new(group_id: u64, raft_message: Vec<u8>) -> Self {
        Self {
            group_id,
            raft_message,
        }
    }

    /// Length-prefixed frame: big-endian u32 length followed by the body.
    pub fn to_frame(&self) -> Bytes {
        let len = self.encoded_len();
        let mut frame = BytesMut::with_capacity(4 + len);
        frame.put_u32(len as u32);
        // BytesMut grows on demand, encode cannot run out of capacity
        let _ = self.encode(&mut frame);
        frame.freeze()
    }
}
