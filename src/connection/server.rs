//! TCP Server
//!
//! Accept loop plus graceful shutdown. Every accepted socket is handed
//! to its own connection task; stopping the server closes the listener,
//! signals every connection to finish, and waits for the tasks up to a
//! caller-supplied deadline before aborting whatever is left.

use crate::commands::CommandHandler;
use crate::connection::handler::{handle_connection, ConnectionStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info};

/// A running TCP server.
///
/// Dropping the handle does not stop the server; call [`TcpServer::stop`]
/// for an orderly shutdown.
#[derive(Debug)]
pub struct TcpServer {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    stats: Arc<ConnectionStats>,
}

impl TcpServer {
    /// Binds the listener and starts accepting connections.
    pub async fn start(
        addr: &str,
        handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            handler,
            Arc::clone(&stats),
            shutdown_rx,
        ));

        info!(addr = %local_addr, "tcp server listening");
        Ok(Self {
            local_addr,
            shutdown_tx,
            accept_task,
            stats,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Stops accepting, signals every connection, and waits up to
    /// `deadline` for outstanding tasks before aborting them.
    pub async fn stop(self, deadline: Duration) {
        let _ = self.shutdown_tx.send(true);

        let mut accept_task = self.accept_task;
        if tokio::time::timeout(deadline, &mut accept_task).await.is_err() {
            info!("tcp server stop deadline elapsed, aborting remaining tasks");
            accept_task.abort();
        }
        info!("tcp server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            handler.clone(),
                            Arc::clone(&stats),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                }
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // Listener closes here; connections have seen the shutdown signal
    // and drain on their own.
    drop(listener);
    while connections.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketManager;
    use crate::protocol::{
        command, encode_key_payload, status, Frame, KeyRequest, HEADER_SIZE,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start_server() -> (TcpServer, String) {
        let buckets = Arc::new(BucketManager::new(2));
        let (_, token) = buckets.create_bucket("demo", "", 2).unwrap();
        let handler = CommandHandler::new(buckets, None);
        let server = TcpServer::start("127.0.0.1:0", handler, Arc::new(ConnectionStats::new()))
            .await
            .unwrap();
        (server, token)
    }

    #[tokio::test]
    async fn test_server_answers_requests() {
        let (server, token) = start_server().await;
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

        let frame = Frame::new(
            command::GET,
            3,
            encode_key_payload(&KeyRequest {
                token,
                bucket: "demo".into(),
                key: "none".into(),
            }),
        );
        client.write_all(&frame.encode()).await.unwrap();

        let mut header = [0u8; HEADER_SIZE];
        client.read_exact(&mut header).await.unwrap();
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let mut body = vec![0u8; length - HEADER_SIZE];
        client.read_exact(&mut body).await.unwrap();

        let mut wire = header.to_vec();
        wire.extend_from_slice(&body);
        let (response, _) = Frame::decode(&wire).unwrap().unwrap();
        assert_eq!(response.request_id, 3);
        assert_eq!(response.split_status().unwrap().0, status::NOT_FOUND);

        server.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_stop_closes_connections() {
        let (server, _) = start_server().await;
        let addr = server.local_addr();

        let mut client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        server.stop(Duration::from_secs(1)).await;

        // The connection is closed from the server side
        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        // And the port no longer accepts
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
