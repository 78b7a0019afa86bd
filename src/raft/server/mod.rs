//! Server layer
//!
//! - `tcp`: length-prefixed frames over TCP, used by storage nodes
//! - `in_process`: in-memory routing for multi-node tests

pub mod in_process;
pub mod tcp;

pub use in_process::{InProcessMessageSender, InProcessServer};
pub use tcp::TcpMessageSender;
