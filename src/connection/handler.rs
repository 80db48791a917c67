//! Per-Connection Handling
//!
//! Each accepted socket gets one handler task. TCP is a byte stream, so
//! the handler accumulates reads in a buffer and peels complete frames
//! off the front; a single read may surface zero frames or several.
//!
//! Frames do not queue behind each other: every decoded frame is
//! dispatched on its own task and its response funnels back through a
//! writer task whenever it is ready. The response carries the request's
//! id, so clients correlate without any ordering guarantee; a slow GET
//! never stalls the SETs pipelined behind it.
//!
//! ```text
//!  socket ──reads──> buffer ──frames──> dispatch tasks ──┐
//!     ▲                                                  │ responses
//!     └────────────── writer task <──── mpsc ────────────┘
//! ```

use crate::commands::CommandHandler;
use crate::protocol::{Frame, ProtocolError};
use bytes::BytesMut;
use socket2::{SockRef, TcpKeepalive};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Cap on buffered unparsed bytes per connection (17 MiB: one maximum
/// frame plus headroom). A client that exceeds it is disconnected.
pub const MAX_CONNECTION_BUFFER: usize = 17 * 1024 * 1024;

/// Initial read buffer capacity.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// TCP keep-alive idle period.
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(120);

/// Queue depth between dispatch tasks and the writer.
const RESPONSE_QUEUE_DEPTH: usize = 256;

/// Statistics shared by every connection of a server.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total frames processed
    pub frames_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame decoding error
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Client closed the connection cleanly
    #[error("client disconnected")]
    ClientDisconnected,

    /// Stream ended mid-frame
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Per-connection buffer cap exceeded
    #[error("connection buffer limit exceeded")]
    BufferFull,
}

/// Serves one client connection until it disconnects, errors, or the
/// server shuts down.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    shutdown: watch::Receiver<bool>,
) {
    stats.connection_opened();
    info!(client = %addr, "client connected");

    let result = serve(stream, addr, handler, Arc::clone(&stats), shutdown).await;

    match &result {
        Ok(()) => info!(client = %addr, "client disconnected"),
        Err(ConnectionError::ClientDisconnected) => {
            debug!(client = %addr, "client disconnected")
        }
        Err(ConnectionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
            debug!(client = %addr, "connection reset by client")
        }
        Err(e) => warn!(client = %addr, error = %e, "connection error"),
    }

    stats.connection_closed();
}

async fn serve(
    stream: TcpStream,
    addr: SocketAddr,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_PERIOD);
    SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;

    let (mut read_half, mut write_half) = stream.into_split();
    let (response_tx, mut response_rx) = mpsc::channel::<Frame>(RESPONSE_QUEUE_DEPTH);

    // Writer task: responses go out in completion order, each tagged
    // with its request id.
    let writer_stats = Arc::clone(&stats);
    let writer = tokio::spawn(async move {
        while let Some(frame) = response_rx.recv().await {
            let bytes = frame.encode();
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
            writer_stats.add_bytes_written(bytes.len());
            writer_stats.frame_processed();
        }
    });

    let mut buffer = BytesMut::with_capacity(INITIAL_BUFFER_SIZE);
    let result = read_loop(
        &mut read_half,
        addr,
        &mut buffer,
        &handler,
        &stats,
        &response_tx,
        &mut shutdown,
    )
    .await;

    // Dropping our sender lets the writer drain in-flight responses and
    // exit once the dispatch tasks finish.
    drop(response_tx);
    let _ = writer.await;
    result
}

#[allow(clippy::too_many_arguments)]
async fn read_loop(
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    addr: SocketAddr,
    buffer: &mut BytesMut,
    handler: &CommandHandler,
    stats: &Arc<ConnectionStats>,
    response_tx: &mpsc::Sender<Frame>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    loop {
        // Peel off every complete frame currently buffered
        loop {
            let decoded = Frame::decode(&buffer[..]).map_err(|e| {
                warn!(client = %addr, error = %e, "frame decode error");
                e
            })?;
            let Some((frame, consumed)) = decoded else {
                break;
            };
            let _ = buffer.split_to(consumed);
            trace!(
                client = %addr,
                request_id = frame.request_id,
                consumed,
                "dispatching frame"
            );

            let handler = handler.clone();
            let response_tx = response_tx.clone();
            tokio::spawn(async move {
                let response = handler.handle_frame(&frame);
                let _ = response_tx.send(response).await;
            });
        }

        if buffer.len() >= MAX_CONNECTION_BUFFER {
            warn!(client = %addr, buffered = buffer.len(), "connection buffer overflow");
            return Err(ConnectionError::BufferFull);
        }

        tokio::select! {
            read = read_half.read_buf(buffer) => {
                let n = read?;
                if n == 0 {
                    return if buffer.is_empty() {
                        Err(ConnectionError::ClientDisconnected)
                    } else {
                        Err(ConnectionError::UnexpectedEof)
                    };
                }
                stats.add_bytes_read(n);
                trace!(client = %addr, bytes = n, "read data");
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    debug!(client = %addr, "server shutdown, closing connection");
                    return Ok(());
                }
            }
        }
    }
}
