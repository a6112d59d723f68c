//! Backend clamd connection
//!
//! Each accepted client gets its own connection to the backend daemon.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::trace;

/// Default connection timeout for the backend daemon
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dialer for the backend clamd daemon
#[derive(Debug, Clone)]
pub struct Backend {
    /// Backend address (`host:port`)
    addr: String,
    /// How long to wait for the TCP handshake
    connect_timeout: Duration,
}

impl Backend {
    /// Create a new backend dialer
    ///
    /// # Arguments
    /// * `addr` - Address of the backend clamd daemon, e.g. `127.0.0.1:3311`
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Get the backend address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Get the connect timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect to the backend daemon with timeout
    pub async fn connect(&self) -> Result<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                Error::BackendTimeout(format!(
                    "connection to {} timed out after {:?}",
                    self.addr, self.connect_timeout
                ))
            })?
            .map_err(|e| {
                Error::BackendNotAvailable(format!("failed to connect to {}: {}", self.addr, e))
            })?;

        stream.set_nodelay(true)?;

        trace!(backend = %self.addr, "Connected to backend");
        Ok(stream)
    }
}
