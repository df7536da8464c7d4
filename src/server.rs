//! TCP server: owns the shared state and runs the accept loop.

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::{ExpiryScheduler, StorageEngine};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// A bound server, ready to accept connections.
pub struct Server {
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    scheduler: ExpiryScheduler,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds the listener and starts the expiry scheduler.
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;

        let storage = Arc::new(StorageEngine::new());
        info!("Storage engine initialized with {} shards", storage.shard_count());

        let scheduler = ExpiryScheduler::start(Arc::clone(&storage), config.expiry_policy);

        Ok(Self {
            listener,
            storage,
            scheduler,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// Each connection runs in its own task. Sessions still open when the
    /// loop stops are not waited for.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = self.local_addr() {
            info!("Listening on {}", addr);
        }

        tokio::select! {
            _ = self.accept_loop() => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
    }

    /// Main loop that accepts incoming connections
    async fn accept_loop(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    // Create a command handler for this connection
                    let handler =
                        CommandHandler::new(Arc::clone(&self.storage), self.scheduler.handle());
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(handle_connection(stream, addr, handler, stats));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn loopback_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Config::default()
        }
    }

    async fn roundtrip(client: &mut TcpStream, request: &[u8], reply_len: usize) -> Vec<u8> {
        client.write_all(request).await.unwrap();
        let mut buf = vec![0u8; reply_len];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_serves_clients_until_shutdown() {
        let server = Arc::new(Server::bind(&loopback_config()).await.unwrap());
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .run_until(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert_eq!(roundtrip(&mut client, b"SET k v\r\n", 5).await, b"+OK\r\n");
        assert_eq!(roundtrip(&mut client, b"GET k\r\n", 7).await, b"$1\r\nv\r\n");
        assert_eq!(server.storage().len(), 1);
        assert_eq!(server.stats().connections_accepted.load(Ordering::Relaxed), 1);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let server = Server::bind(&loopback_config()).await.unwrap();
        let config = Config {
            port: server.local_addr().unwrap().port(),
            ..loopback_config()
        };

        assert!(Server::bind(&config).await.is_err());
    }
}
