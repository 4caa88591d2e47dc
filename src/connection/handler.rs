//! Connection Handler Module
//!
//! This module handles individual client connections. Each client gets its
//! own handler task that runs in a loop, reading commands and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Decode every complete   │ │
//!    │  │ value in the buffer     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute, queue replies  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Flush replies           │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read more bytes         │ │
//!    │  │ (or stop on shutdown)   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / error / server shutdown
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! Incoming data accumulates in a `BytesMut` buffer. TCP is a stream
//! protocol, so one read may hold half a command or several pipelined ones.
//! Complete values are decoded off the front; an incomplete tail waits for
//! the next read. A malformed value gets `-ERR invalid RESP message` and the
//! buffered bytes are dropped, since there is no reliable way to find the
//! start of the next command.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, Reply, RespParser, Value};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer (16 MB)
const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Reply sent for any undecodable input
const INVALID_MESSAGE: &str = "ERR invalid RESP message";

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total malformed messages rejected
    pub protocol_errors: AtomicU64,
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

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// This struct manages the read buffer, parsing, and reply sending for one
/// connected client.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Scratch buffer for encoding replies
    out: Vec<u8>,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// RESP parser
    parser: RespParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Flips to `true` when the server is shutting down
    shutdown: watch::Receiver<bool>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    /// * `shutdown` - Server shutdown signal
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            out: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
            shutdown,
        }
    }

    /// Uses `parser` (and its integer-inference setting) for this connection.
    pub fn with_parser(mut self, parser: RespParser) -> Self {
        self.parser = parser;
        self
    }

    /// Runs the main connection loop.
    ///
    /// This method reads commands from the client, executes them, and sends
    /// back replies until the client disconnects, an I/O error occurs, or the
    /// server shuts down.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Connection closed by server"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let mut replies = 0;
            while let Some(frame) = self.next_frame() {
                let reply = match frame {
                    Ok(command) => {
                        self.stats.command_processed();
                        self.command_handler.execute(command).await
                    }
                    Err(e) => {
                        warn!(client = %self.addr, error = %e, "Malformed message");
                        self.stats.protocol_error();
                        Reply::error(INVALID_MESSAGE)
                    }
                };
                self.queue_reply(&reply).await?;
                replies += 1;
            }

            if replies > 0 {
                self.stream.flush().await?;
            }

            if *self.shutdown.borrow() {
                debug!(client = %self.addr, "Server shutting down, closing connection");
                return Ok(());
            }

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Decodes the next complete value off the front of the buffer.
    ///
    /// Returns `None` when the buffer is empty or holds only part of a value.
    /// On a decode error the buffer is discarded.
    fn next_frame(&mut self) -> Option<Result<Value, ParseError>> {
        if self.buffer.is_empty() {
            return None;
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Some(Ok(value))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                None
            }
            Err(e) => {
                self.buffer.clear();
                self.parser = RespParser::with_integer_inference(self.parser.infers_integers());
                Some(Err(e))
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// Returns `Ok(false)` if the server began shutting down while waiting.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = tokio::select! {
            result = self.stream.get_mut().read_buf(&mut self.buffer) => result?,
            _ = self.shutdown.changed() => {
                debug!(client = %self.addr, "Shutdown signalled while idle");
                return Ok(false);
            }
        };

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial command in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Writes a reply into the outgoing buffer; flushed once per batch.
    async fn queue_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        self.out.clear();
        reply.serialize_into(&mut self.out);
        self.stream.write_all(&self.out).await?;
        self.stats.bytes_written(self.out.len());
        trace!(
            client = %self.addr,
            bytes = self.out.len(),
            "Queued reply"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler and runs
/// it to completion.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
/// * `parser` - Parser prototype (carries the integer-inference setting)
/// * `stats` - Shared connection statistics
/// * `shutdown` - Server shutdown signal
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    parser: RespParser,
    stats: Arc<ConnectionStats>,
    shutdown: watch::Receiver<bool>,
) {
    let handler =
        ConnectionHandler::new(stream, addr, command_handler, stats, shutdown).with_parser(parser);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SnapshotManager;
    use crate::storage::Store;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct TestServer {
        addr: SocketAddr,
        store: Arc<Store>,
        stats: Arc<ConnectionStats>,
        shutdown_tx: watch::Sender<bool>,
    }

    async fn create_test_server_with(parser: RespParser) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Store::new());
        let stats = Arc::new(ConnectionStats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handler = CommandHandler::new(
            Arc::clone(&store),
            Arc::new(SnapshotManager::new("never-written.json")),
        );
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    handler.clone(),
                    parser.clone(),
                    Arc::clone(&stats_clone),
                    shutdown_rx.clone(),
                ));
            }
        });

        TestServer {
            addr,
            store,
            stats,
            shutdown_tx,
        }
    }

    async fn create_test_server() -> TestServer {
        create_test_server_with(RespParser::new()).await
    }

    /// Reads exactly `len` bytes, failing the test after two seconds.
    async fn read_exact_reply(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        buf
    }

    async fn roundtrip(client: &mut TcpStream, request: &[u8], expected: &[u8]) {
        client.write_all(request).await.unwrap();
        let reply = read_exact_reply(client, expected.len()).await;
        assert_eq!(
            String::from_utf8_lossy(&reply),
            String::from_utf8_lossy(expected)
        );
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_set_get() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$3\r\nAda\r\n",
            b"+OK\r\n",
        )
        .await;
        roundtrip(
            &mut client,
            b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n",
            b"$3\r\nAda\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk2\r\n",
            b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_command_split_across_writes() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"*2\r\n$4\r\nEC").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        roundtrip(&mut client, b"HO\r\n$2\r\nhi\r\n", b"$2\r\nhi\r\n").await;
    }

    #[tokio::test]
    async fn test_malformed_input_keeps_connection_open() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(&mut client, b"hello\r\n", b"-ERR invalid RESP message\r\n").await;
        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

        assert_eq!(server.stats.protocol_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_command_errors_keep_connection_open() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(&mut client, b"*1\r\n$4\r\nNOPE\r\n", b"-ERR unknown command\r\n").await;
        roundtrip(&mut client, b"+PING\r\n", b"-ERR invalid command\r\n").await;
        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_integer_inference() {
        let server = create_test_server_with(RespParser::with_integer_inference(true)).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$1\r\nn\r\n$2\r\n10\r\n",
            b"+OK\r\n",
        )
        .await;
        roundtrip(&mut client, b"*2\r\n$4\r\nINCR\r\n$1\r\nn\r\n", b"+OK\r\n").await;

        assert_eq!(server.store.get("n").unwrap().value, Value::Integer(11));
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_connection() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

        server.shutdown_tx.send(true).unwrap();

        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("connection was not closed")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let server = create_test_server().await;
        let stats = &server.stats;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
