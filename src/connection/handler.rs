//! Connection Handler Module
//!
//! This module runs one client session: it reads commands from the stream,
//! executes them and writes the replies back until the client quits, the
//! stream fails, or the client sends something unparseable.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. Session task spawned inside a fault boundary
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse next command      │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send response           │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │   [Loop back unless QUIT]    │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. QUIT / disconnect / error / panic
//!        │
//!        ▼
//! 5. Stream dropped, connection closed
//! ```
//!
//! A panic inside a session only unwinds that session's task. The boundary in
//! [`handle_connection`] logs it and the listener carries on.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tracing::{debug, error, info, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
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

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client session over any duplex byte stream.
pub struct ConnectionHandler<S> {
    /// Request side of the stream
    parser: RespParser<ReadHalf<S>>,

    /// Reply side of the stream
    writer: BufWriter<WriteHalf<S>>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// The command handler
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S: AsyncRead + AsyncWrite> ConnectionHandler<S> {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client's stream
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();
        let (reader, writer) = tokio::io::split(stream);

        Self {
            parser: RespParser::new(reader),
            writer: BufWriter::new(writer),
            addr,
            command_handler,
            stats,
        }
    }

    /// Runs the session until it ends.
    ///
    /// Returns `Ok(())` after a well-formed QUIT.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                info!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let command = match self.parser.next_command().await {
                Ok(Some(command)) => command,
                Ok(None) => return Err(ConnectionError::ClientDisconnected),
                Err(e) => return Err(self.report_parse_error(e).await),
            };

            trace!(client = %self.addr, command = %command.dispatch_key(), "Parsed command");

            let execution = self.command_handler.execute(&command);
            self.stats.command_processed();

            self.send_response(&execution.response).await?;

            if !execution.keep_alive {
                return Ok(());
            }
        }
    }

    /// Tells the client why its session is ending. The stream may already be
    /// unusable, so a failed write is ignored.
    async fn report_parse_error(&mut self, e: ParseError) -> ConnectionError {
        warn!(client = %self.addr, error = %e, "Parse error");

        let reply = RespValue::error(format!("ERR {}", e));
        if let Err(write_err) = self.send_response(&reply).await {
            trace!(client = %self.addr, error = %write_err, "Could not report parse error");
        }

        match e {
            ParseError::Io(io_err) => ConnectionError::IoError(io_err),
            other => ConnectionError::ParseError(other),
        }
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            reply = %response,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

impl<S> Drop for ConnectionHandler<S> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}

/// Errors that can end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed request
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client closed the stream between requests
    #[error("Client disconnected")]
    ClientDisconnected,
}

/// How a session ended, as seen from outside its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// QUIT or a clean disconnect
    Completed,
    /// Stream or protocol failure
    Failed,
    /// The session panicked and was contained
    Panicked,
}

/// Handles a client connection.
///
/// The session runs in its own task, so a panic anywhere in it ends only
/// this connection.
///
/// # Arguments
///
/// * `stream` - The client's stream
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
/// * `stats` - Shared connection statistics
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) -> SessionOutcome
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    isolate_session(addr, handler.run()).await
}

/// Runs `session` as a separate task and converts its result, including a
/// panic, into a [`SessionOutcome`].
pub async fn isolate_session<F>(addr: SocketAddr, session: F) -> SessionOutcome
where
    F: Future<Output = Result<(), ConnectionError>> + Send + 'static,
{
    match tokio::spawn(session).await {
        Ok(Ok(())) | Ok(Err(ConnectionError::ClientDisconnected)) => SessionOutcome::Completed,
        Ok(Err(e)) => {
            debug!(client = %addr, error = %e, "Connection ended with error");
            SessionOutcome::Failed
        }
        Err(join_err) if join_err.is_panic() => {
            let panic = join_err.into_panic();
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(client = %addr, panic = %message, "Session panicked, connection closed");
            SessionOutcome::Panicked
        }
        Err(join_err) => {
            debug!(client = %addr, error = %join_err, "Session task cancelled");
            SessionOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ExpiryPolicy, ExpiryScheduler, StorageEngine};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    struct TestServer {
        addr: SocketAddr,
        stats: Arc<ConnectionStats>,
        _scheduler: ExpiryScheduler,
    }

    async fn create_test_server(policy: ExpiryPolicy) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let scheduler = ExpiryScheduler::start(Arc::clone(&storage), policy);
        let stats = Arc::new(ConnectionStats::new());

        let expiry = scheduler.handle();
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage), expiry.clone());
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, handler, stats));
            }
        });

        TestServer {
            addr,
            stats,
            _scheduler: scheduler,
        }
    }

    async fn expect_reply<R: AsyncRead + Unpin>(client: &mut R, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected)
        );
    }

    async fn expect_closed<R: AsyncRead + Unpin>(client: &mut R) {
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("timed out waiting for close")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_set_get_multibulk() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .await
            .unwrap();
        expect_reply(&mut client, b"+OK\r\n").await;

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        expect_reply(&mut client, b"$4\r\nAriz\r\n").await;
    }

    #[tokio::test]
    async fn test_inline_commands() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"SET k \"v 1\"\r\n").await.unwrap();
        expect_reply(&mut client, b"+OK\r\n").await;

        client.write_all(b"get k\r\n").await.unwrap();
        expect_reply(&mut client, b"$3\r\nv 1\r\n").await;

        client.write_all(b"GET missing\r\n").await.unwrap();
        expect_reply(&mut client, b"$-1\r\n").await;
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\nSET k2 v2\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\nDEL k1 k2 k3\r\n")
            .await
            .unwrap();

        expect_reply(&mut client, b"+OK\r\n+OK\r\n$2\r\nv1\r\n:2\r\n").await;
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_session() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"FOO\r\n").await.unwrap();
        expect_reply(&mut client, b"-ERR unknown command 'FOO'\r\n").await;

        client.write_all(b"GET k\r\n").await.unwrap();
        expect_reply(&mut client, b"$-1\r\n").await;
    }

    #[tokio::test]
    async fn test_quit_closes_session() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"QUIT\r\n").await.unwrap();
        expect_reply(&mut client, b"+OK\r\n").await;
        expect_closed(&mut client).await;
    }

    #[tokio::test]
    async fn test_quit_with_arguments_keeps_session() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"QUIT now\r\n").await.unwrap();
        expect_reply(
            &mut client,
            b"-ERR wrong number of arguments for 'QUIT' command\r\n",
        )
        .await;

        client.write_all(b"GET k\r\n").await.unwrap();
        expect_reply(&mut client, b"$-1\r\n").await;
    }

    #[tokio::test]
    async fn test_missing_closing_quote_ends_session() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"SET k \"v\r\n").await.unwrap();
        expect_reply(&mut client, b"-ERR missing closing quotes\r\n").await;
        expect_closed(&mut client).await;
    }

    #[tokio::test]
    async fn test_sessions_share_store() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let mut writer = TcpStream::connect(server.addr).await.unwrap();
        let mut reader = TcpStream::connect(server.addr).await.unwrap();

        writer.write_all(b"SET shared yes\r\n").await.unwrap();
        expect_reply(&mut writer, b"+OK\r\n").await;

        reader.write_all(b"GET shared\r\n").await.unwrap();
        expect_reply(&mut reader, b"$3\r\nyes\r\n").await;
    }

    #[tokio::test]
    async fn test_expiry_outlives_session() {
        let server = create_test_server(ExpiryPolicy::Generational).await;

        let mut first = TcpStream::connect(server.addr).await.unwrap();
        first.write_all(b"SET k v PX 50\r\nQUIT\r\n").await.unwrap();
        expect_reply(&mut first, b"+OK\r\n+OK\r\n").await;
        drop(first);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut second = TcpStream::connect(server.addr).await.unwrap();
        second.write_all(b"GET k\r\n").await.unwrap();
        expect_reply(&mut second, b"$-1\r\n").await;
    }

    #[tokio::test]
    async fn test_stale_timer_with_unconditional_policy() {
        let server = create_test_server(ExpiryPolicy::Unconditional).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client
            .write_all(b"SET k v1 PX 50\r\nSET k v2\r\n")
            .await
            .unwrap();
        expect_reply(&mut client, b"+OK\r\n+OK\r\n").await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        client.write_all(b"GET k\r\n").await.unwrap();
        expect_reply(&mut client, b"$-1\r\n").await;
    }

    #[tokio::test]
    async fn test_duplex_session_outcome() {
        let storage = Arc::new(StorageEngine::new());
        let scheduler = ExpiryScheduler::start(Arc::clone(&storage), ExpiryPolicy::Generational);
        let stats = Arc::new(ConnectionStats::new());
        let handler = CommandHandler::new(storage, scheduler.handle());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let (mut client, server) = tokio::io::duplex(1024);
        let session = tokio::spawn(handle_connection(server, addr, handler, Arc::clone(&stats)));

        client.write_all(b"SET a 1\r\nQUIT\r\n").await.unwrap();
        expect_reply(&mut client, b"+OK\r\n+OK\r\n").await;

        assert_eq!(session.await.unwrap(), SessionOutcome::Completed);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_truncated_request_fails_session() {
        let storage = Arc::new(StorageEngine::new());
        let scheduler = ExpiryScheduler::start(Arc::clone(&storage), ExpiryPolicy::Generational);
        let stats = Arc::new(ConnectionStats::new());
        let handler = CommandHandler::new(storage, scheduler.handle());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let (mut client, server) = tokio::io::duplex(1024);
        let session = tokio::spawn(handle_connection(server, addr, handler, stats));

        client.write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nna").await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(session.await.unwrap(), SessionOutcome::Failed);
    }

    #[tokio::test]
    async fn test_panicking_session_is_contained() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        async fn panicking_session() -> Result<(), ConnectionError> {
            panic!("boom")
        }

        let outcome = isolate_session(addr, panicking_session()).await;
        assert_eq!(outcome, SessionOutcome::Panicked);

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        client.write_all(b"GET k\r\n").await.unwrap();
        expect_reply(&mut client, b"$-1\r\n").await;
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let server = create_test_server(ExpiryPolicy::Generational).await;
        let stats = &server.stats;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.write_all(b"GET k\r\n").await.unwrap();
        expect_reply(&mut client, b"$-1\r\n").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 5);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
