//! TCP server for the clamd proxy
//!
//! Listens for client connections and spawns a proxy handler for each one.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

/// TCP server accepting clamd client connections
pub struct Server {
    /// Address to listen on (`host:port`)
    listen_addr: String,
    /// The listener (created on bind)
    listener: Option<TcpListener>,
}

impl Server {
    /// Create a new server that will listen on the specified address
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            listener: None,
        }
    }

    /// Get the configured listen address
    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    /// Get the bound address, once bound
    ///
    /// Differs from the configured address when port 0 was requested.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Bind the listener
    pub async fn bind(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await.map_err(|e| {
            Error::Socket(format!("Failed to listen on {}: {}", self.listen_addr, e))
        })?;

        info!(addr = %self.listen_addr, "Server listening");
        self.listener = Some(listener);
        Ok(())
    }

    /// Run the server with a connection handler
    ///
    /// Runs until the shutdown signal is received. Sessions already running
    /// are left to finish on their own.
    pub async fn run<F, Fut>(&self, handler: F, mut shutdown_rx: watch::Receiver<bool>) -> Result<()>
    where
        F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::Socket("Server is not bound".to_string()))?;

        let handler = Arc::new(handler);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal, stopping server");
                        break;
                    }
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            trace!(peer = %addr, "Accepted new client connection");
                            let handler = Arc::clone(&handler);
                            tokio::spawn(async move {
                                if let Err(e) = handler(stream).await {
                                    debug!(error = %e, "Connection handler error");
                                }
                            });
                        }
                        Err(e) => {
                            // Keep accepting other connections
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_server_new() {
        let server = Server::new("127.0.0.1:3310");
        assert_eq!(server.listen_addr(), "127.0.0.1:3310");
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_server_bind_ephemeral_port() {
        let mut server = Server::new("127.0.0.1:0");
        server.bind().await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_server_bind_in_use() {
        let mut first = Server::new("127.0.0.1:0");
        first.bind().await.unwrap();
        let addr = first.local_addr().unwrap();

        let mut second = Server::new(addr.to_string());
        let err = second.bind().await.unwrap_err();
        assert!(matches!(err, Error::Socket(_)));
    }

    #[tokio::test]
    async fn test_run_requires_bind() {
        let server = Server::new("127.0.0.1:0");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let result = server
            .run(|_stream: TcpStream| async { Ok::<(), Error>(()) }, shutdown_rx)
            .await;
        assert!(matches!(result, Err(Error::Socket(_))));
    }

    #[tokio::test]
    async fn test_server_run_and_shutdown() {
        let mut server = Server::new("127.0.0.1:0");
        server.bind().await.unwrap();
        let addr = server.local_addr().unwrap();

        let handled = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let counter = Arc::clone(&handled);
        let run = tokio::spawn(async move {
            server
                .run(
                    move |mut stream: TcpStream| {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            stream.write_all(b"hi").await?;
                            Ok::<(), Error>(())
                        }
                    },
                    shutdown_rx,
                )
                .await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        assert_eq!(handled.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
