//! Reference TCP Client
//!
//! One connection, many in-flight requests. Every request picks a fresh
//! id from an atomic counter and parks a response slot in the pending
//! table; the read task delivers frames to their slots as they arrive,
//! in whatever order the server finishes them.
//!
//! Writes funnel through a queue drained by a writer task that packs up
//! to [`MAX_WRITE_BATCH`] queued frames into a single syscall, which is
//! what makes small-request pipelining cheap.
//!
//! ```text
//!  set/get/delete ──> pending table ──────────────┐
//!        │                                        │ deliver by id
//!        └──> write queue ──> writer task     read task
//!                                  │              ▲
//!                                  ▼              │
//!                                 socket ─────────┘
//! ```
//!
//! Closing the client cancels every outstanding waiter with
//! [`ClientError::Closed`].

use crate::protocol::{
    codec, command, status, Frame, KeyRequest, ProtocolError, SetRequest, ValueResponse,
    HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use socket2::{SockRef, TcpKeepalive};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// Most frames packed into one flush.
const MAX_WRITE_BATCH: usize = 50;

/// Write queue depth.
const WRITE_QUEUE_DEPTH: usize = 1_024;

/// Client-side keep-alive idle period.
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

/// Errors surfaced by client calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The per-request wait elapsed
    #[error("request timeout")]
    Timeout,

    /// The client was closed, or the connection died
    #[error("client closed")]
    Closed,

    /// Connecting or socket setup failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a non-success status
    #[error("server error: status {status:#04x}: {message}")]
    Status { status: u8, message: String },

    /// The response payload did not decode
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Connection options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Frame>>>>;

/// A pipelined client over one TCP connection.
#[derive(Debug)]
pub struct Client {
    next_request_id: AtomicU64,
    pending: PendingMap,
    write_tx: mpsc::Sender<Bytes>,
    closed: Arc<AtomicBool>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

impl Client {
    /// Connects and spawns the read and write tasks.
    pub async fn connect(addr: &str, opts: ClientOptions) -> Result<Self, ClientError> {
        let stream = tokio::time::timeout(opts.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)??;

        stream.set_nodelay(true)?;
        let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_PERIOD);
        SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;

        let (read_half, write_half) = stream.into_split();
        let (write_tx, write_rx) = mpsc::channel::<Bytes>(WRITE_QUEUE_DEPTH);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let write_task = tokio::spawn(write_loop(write_half, write_rx, opts.write_timeout));
        let read_task = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&pending),
            Arc::clone(&closed),
            opts.read_timeout,
        ));

        Ok(Self {
            next_request_id: AtomicU64::new(0),
            pending,
            write_tx,
            closed,
            read_task,
            write_task,
        })
    }

    /// Stores a value. `ttl_seconds` of 0 means never expire.
    #[allow(clippy::too_many_arguments)]
    pub async fn set(
        &self,
        token: &str,
        bucket: &str,
        key: &str,
        value: Bytes,
        ttl_seconds: i64,
        single_read: bool,
        wait: Duration,
    ) -> Result<(), ClientError> {
        let payload = codec::encode_set_payload(&SetRequest {
            token: token.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            ttl: ttl_seconds,
            single_read,
            value,
        });
        let response = self.request(command::SET, payload, wait).await?;
        expect_status(&response, status::CREATED).map(|_| ())
    }

    /// Fetches a value and its metadata.
    pub async fn get(
        &self,
        token: &str,
        bucket: &str,
        key: &str,
        wait: Duration,
    ) -> Result<ValueResponse, ClientError> {
        let payload = codec::encode_key_payload(&KeyRequest {
            token: token.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        let response = self.request(command::GET, payload, wait).await?;
        let body = expect_status(&response, status::OK)?;
        Ok(codec::decode_value_response(body)?)
    }

    /// Deletes a key.
    pub async fn delete(
        &self,
        token: &str,
        bucket: &str,
        key: &str,
        wait: Duration,
    ) -> Result<(), ClientError> {
        let payload = codec::encode_key_payload(&KeyRequest {
            token: token.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        let response = self.request(command::DELETE, payload, wait).await?;
        expect_status(&response, status::NO_CONTENT).map(|_| ())
    }

    /// Sends one frame and waits for the frame that echoes its id.
    async fn request(
        &self,
        command: u8,
        payload: Bytes,
        wait: Duration,
    ) -> Result<Frame, ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Frame::new(command, request_id, payload);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        if self.write_tx.send(frame.encode()).await.is_err() {
            self.pending.lock().remove(&request_id);
            return Err(ClientError::Closed);
        }

        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(frame)) => Ok(frame),
            // Sender dropped: the read loop died and drained the table
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(ClientError::Timeout)
            }
        }
    }

    /// Closes the connection and fails every outstanding waiter.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.read_task.abort();
        self.write_task.abort();
        // Dropping the senders wakes every waiter with Closed
        self.pending.lock().clear();
        debug!("client closed");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

fn expect_status(frame: &Frame, want: u8) -> Result<&[u8], ClientError> {
    let (status, body) = frame.split_status()?;
    if frame.command == command::RESPONSE && status == want {
        Ok(body)
    } else {
        Err(ClientError::Status {
            status,
            message: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

/// Drains the write queue, packing waiting frames into single writes.
async fn write_loop(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut write_rx: mpsc::Receiver<Bytes>,
    write_timeout: Duration,
) {
    let mut batch = BytesMut::new();

    while let Some(data) = write_rx.recv().await {
        batch.clear();
        batch.extend_from_slice(&data);

        let mut count = 1;
        while count < MAX_WRITE_BATCH {
            match write_rx.try_recv() {
                Ok(more) => {
                    batch.extend_from_slice(&more);
                    count += 1;
                }
                Err(_) => break,
            }
        }

        let write = write_half.write_all(&batch);
        match tokio::time::timeout(write_timeout, write).await {
            Ok(Ok(())) => {}
            _ => {
                debug!("client write failed, stopping writer");
                return;
            }
        }
    }
}

/// Reads frames and delivers each to the waiter holding its request id.
async fn read_loop(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    read_timeout: Duration,
) {
    let mut header = [0u8; HEADER_SIZE];

    loop {
        let read = tokio::time::timeout(read_timeout, read_half.read_exact(&mut header)).await;
        if !matches!(read, Ok(Ok(_))) {
            break;
        }

        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if length < HEADER_SIZE || length > HEADER_SIZE + MAX_PAYLOAD_SIZE {
            debug!(length, "invalid frame length from server");
            break;
        }

        let mut body = vec![0u8; length - HEADER_SIZE];
        let read = tokio::time::timeout(read_timeout, read_half.read_exact(&mut body)).await;
        if !matches!(read, Ok(Ok(_))) {
            break;
        }

        let request_id = u64::from_be_bytes([
            header[5], header[6], header[7], header[8], header[9], header[10], header[11],
            header[12],
        ]);
        let frame = Frame::new(header[4], request_id, Bytes::from(body));

        let waiter = pending.lock().remove(&request_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(frame);
            }
            None => debug!(request_id, "response with no waiter"),
        }
    }

    // Connection is done: every remaining waiter gets Closed
    closed.store(true, Ordering::Release);
    pending.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketManager;
    use crate::commands::CommandHandler;
    use crate::connection::{ConnectionStats, TcpServer};

    const WAIT: Duration = Duration::from_secs(5);

    async fn start_server() -> (TcpServer, String) {
        let buckets = Arc::new(BucketManager::new(2));
        let (_, token) = buckets.create_bucket("demo", "", 4).unwrap();
        let handler = CommandHandler::new(buckets, None);
        let server = TcpServer::start("127.0.0.1:0", handler, Arc::new(ConnectionStats::new()))
            .await
            .unwrap();
        (server, token)
    }

    async fn connect(server: &TcpServer) -> Client {
        Client::connect(&server.local_addr().to_string(), ClientOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_get_delete_round_trip() {
        let (server, token) = start_server().await;
        let client = connect(&server).await;

        client
            .set(&token, "demo", "foo", Bytes::from("hello"), 0, false, WAIT)
            .await
            .unwrap();

        let value = client.get(&token, "demo", "foo", WAIT).await.unwrap();
        assert_eq!(value.value, Bytes::from("hello"));
        assert_eq!(value.key, "foo");
        assert_eq!(value.expires_at, 0);

        client.delete(&token, "demo", "foo", WAIT).await.unwrap();

        let err = client.get(&token, "demo", "foo", WAIT).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Status {
                status: status::NOT_FOUND,
                ..
            }
        ));

        server.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let (server, _) = start_server().await;
        let client = connect(&server).await;

        let bogus = hex::encode([0u8; 16]);
        let err = client
            .set(&bogus, "demo", "k", Bytes::from("v"), 0, false, WAIT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Status {
                status: status::UNAUTHORIZED,
                ..
            }
        ));

        server.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_pipelined_requests_correlate_by_id() {
        let (server, token) = start_server().await;
        let client = Arc::new(connect(&server).await);

        // Seed distinct keys
        for i in 0..100 {
            client
                .set(
                    &token,
                    "demo",
                    &format!("key-{i}"),
                    Bytes::from(format!("value-{i}")),
                    0,
                    false,
                    WAIT,
                )
                .await
                .unwrap();
        }

        // A thousand concurrent GETs on the one connection; every
        // response must land on the request that asked for it.
        let mut tasks = Vec::new();
        for n in 0..1_000 {
            let client = Arc::clone(&client);
            let token = token.clone();
            let i = n % 100;
            tasks.push(tokio::spawn(async move {
                let value = client
                    .get(&token, "demo", &format!("key-{i}"), WAIT)
                    .await
                    .unwrap();
                assert_eq!(value.value, Bytes::from(format!("value-{i}")));
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        server.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_ttl_round_trips_on_wire() {
        let (server, token) = start_server().await;
        let client = connect(&server).await;

        client
            .set(&token, "demo", "tmp", Bytes::from("x"), 3_600, false, WAIT)
            .await
            .unwrap();

        let value = client.get(&token, "demo", "tmp", WAIT).await.unwrap();
        assert_eq!(value.ttl, 3_600);
        assert!(value.expires_at > value.created_at);

        server.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_closed_client_rejects_requests() {
        let (server, token) = start_server().await;
        let client = connect(&server).await;

        client.close();
        let err = client.get(&token, "demo", "k", WAIT).await.unwrap_err();
        assert!(matches!(err, ClientError::Closed));

        server.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_single_read_over_the_wire() {
        let (server, token) = start_server().await;
        let client = connect(&server).await;

        client
            .set(&token, "demo", "otp", Bytes::from("one"), 0, true, WAIT)
            .await
            .unwrap();

        let value = client.get(&token, "demo", "otp", WAIT).await.unwrap();
        assert_eq!(value.value, Bytes::from("one"));
        assert!(value.single_read);

        let err = client.get(&token, "demo", "otp", WAIT).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Status {
                status: status::NOT_FOUND,
                ..
            }
        ));

        server.stop(Duration::from_secs(1)).await;
    }
}
