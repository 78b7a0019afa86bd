//! TCP server and sender
//!
//! Frames are a big-endian `u32` length followed by a prost-encoded
//! [`GenericMessage`]. Each destination address gets one outbound connection
//! fed by a bounded queue; connections are (re)established lazily and a
//! message that cannot be written is dropped, leaving retransmission to raft.

use crate::raft::cluster_router::ClusterRouter;
use crate::raft::errors::{RuntimeError, TransportError};
use crate::raft::message::{GenericMessage, MAX_FRAME_LEN};
use crate::raft::transport::MessageSender;
use async_trait::async_trait;
use parking_lot::Mutex;
use prost::Message;
use slog::{debug, info, warn, Logger};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const OUTBOUND_QUEUE: usize = 4096;

/// Bind `address` and serve incoming frames into `router` until `shutdown`
/// fires. Returns the bound socket address.
pub async fn serve(
    address: &str,
    router: Arc<ClusterRouter>,
    shutdown: CancellationToken,
    logger: Logger,
) -> Result<SocketAddr, RuntimeError> {
    let listener = TcpListener::bind(address).await.map_err(|source| RuntimeError::Bind {
        address: address.to_string(),
        source,
    })?;
    let local_addr = listener.local_addr().map_err(|source| RuntimeError::Bind {
        address: address.to_string(),
        source,
    })?;

    info!(logger, "Raft server listening"; "address" => %local_addr);
    tokio::spawn(accept_loop(listener, router, shutdown, logger));
    Ok(local_addr)
}

async fn accept_loop(listener: TcpListener, router: Arc<ClusterRouter>, shutdown: CancellationToken, logger: Logger) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(logger, "Accepted raft connection"; "peer" => %peer);
                    let _ = stream.set_nodelay(true);
                    let peer_logger = logger.new(slog::o!("peer" => peer.to_string()));
                    tokio::spawn(read_loop(stream, router.clone(), shutdown.clone(), peer_logger));
                }
                Err(e) => warn!(logger, "Failed to accept raft connection"; "error" => %e),
            }
        }
    }
    info!(logger, "Raft server stopped");
}

async fn read_loop(mut stream: TcpStream, router: Arc<ClusterRouter>, shutdown: CancellationToken, logger: Logger) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = read_frame(&mut stream) => frame,
        };

        match frame {
            Ok(Some(message)) => {
                if let Err(e) = router.route_message(message) {
                    debug!(logger, "Dropped incoming message"; "error" => %e);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(logger, "Closing raft connection"; "error" => %e);
                break;
            }
        }
    }
}

/// Read one frame; `None` on a clean end of stream.
async fn read_frame(stream: &mut TcpStream) -> io::Result<Option<GenericMessage>> {
    let len = match stream.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    GenericMessage::decode(body.as_slice())
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// [`MessageSender`] writing frames over TCP
pub struct TcpMessageSender {
    connections: Mutex<HashMap<String, mpsc::Sender<GenericMessage>>>,
    logger: Logger,
}

impl TcpMessageSender {
    pub fn new(logger: Logger) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            logger,
        }
    }

    fn queue_for(&self, address: &str) -> mpsc::Sender<GenericMessage> {
        let mut connections = self.connections.lock();
        if let Some(tx) = connections.get(address) {
            if !tx.is_closed() {
                return tx.clone();
            }
        }

        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let logger = self.logger.new(slog::o!("peer" => address.to_string()));
        tokio::spawn(write_loop(address.to_string(), rx, logger));
        connections.insert(address.to_string(), tx.clone());
        tx
    }
}

#[async_trait]
impl MessageSender for TcpMessageSender {
    async fn send(&self, address: &str, message: GenericMessage) -> Result<(), TransportError> {
        self.queue_for(address).try_send(message).map_err(|e| {
            let reason = match e {
                TrySendError::Full(_) => "outbound queue full",
                TrySendError::Closed(_) => "connection task stopped",
            };
            TransportError::SendFailed {
                address: address.to_string(),
                reason: reason.to_string(),
            }
        })
    }
}

async fn write_loop(address: String, mut rx: mpsc::Receiver<GenericMessage>, logger: Logger) {
    let mut stream: Option<TcpStream> = None;

    while let Some(message) = rx.recv().await {
        if stream.is_none() {
            match timeout(CONNECT_TIMEOUT, TcpStream::connect(&address)).await {
                Ok(Ok(connected)) => {
                    let _ = connected.set_nodelay(true);
                    debug!(logger, "Connected to peer");
                    stream = Some(connected);
                }
                Ok(Err(e)) => {
                    debug!(logger, "Failed to connect to peer"; "error" => %e);
                    continue;
                }
                Err(_) => {
                    debug!(logger, "Connection to peer timed out");
                    continue;
                }
            }
        }

        if let Some(connected) = stream.as_mut() {
            if let Err(e) = connected.write_all(&message.to_frame()).await {
                debug!(logger, "Failed to write to peer, reconnecting"; "error" => %e);
                stream = None;
            }
        }
    }
}
