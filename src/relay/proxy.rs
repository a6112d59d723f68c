//! clamd proxy core logic
//!
//! Pairs every accepted client with a fresh backend connection and runs a
//! filtering session between them.

use crate::error::Result;
use crate::filter::AllowList;
use crate::logging::{AuditSink, LogEvent};
use crate::pool::BufferPools;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tracing::{debug, error};

use super::Backend;
use super::session::{ProxySession, SessionContext};

/// clamd proxy that filters commands
pub struct Proxy {
    /// Backend daemon dialer
    backend: Arc<Backend>,
    /// Commands permitted to reach the backend
    allow_list: Arc<AllowList>,
    /// Buffer pools shared by all sessions
    pools: Arc<BufferPools>,
    /// Optional JSONL audit log
    audit: Option<AuditSink>,
    /// Connection counter for client IDs
    connection_counter: AtomicU64,
}

impl Proxy {
    /// Create a new proxy with the default allow-list
    pub fn new(backend: Backend) -> Self {
        Self::with_allow_list(backend, AllowList::default())
    }

    /// Create a new proxy with a custom allow-list
    pub fn with_allow_list(backend: Backend, allow_list: AllowList) -> Self {
        Self {
            backend: Arc::new(backend),
            allow_list: Arc::new(allow_list),
            pools: Arc::new(BufferPools::new()),
            audit: None,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Attach a JSONL audit log
    pub fn with_audit(mut self, audit: Option<AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Get a reference to the backend
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Get a reference to the allow-list
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    async fn audit(&self, event: LogEvent) {
        if let Some(sink) = &self.audit {
            sink.log(event).await;
        }
    }

    /// Handle a client connection
    ///
    /// Dials the backend, then relays until either side closes. If the
    /// backend cannot be reached the client connection is closed and the
    /// dial error is returned.
    pub async fn handle_client(&self, client_stream: TcpStream) -> Result<()> {
        let client_id = self.connection_counter.fetch_add(1, Ordering::Relaxed);
        let peer = client_stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        debug!(client_id, peer = %peer, "Client connected");
        self.audit(LogEvent::client_connect(client_id.to_string(), peer.as_str()))
            .await;

        let result = self.handle_client_inner(client_id, &peer, client_stream).await;

        debug!(client_id, peer = %peer, "Client disconnected");
        self.audit(LogEvent::client_disconnect(client_id.to_string(), peer.as_str()))
            .await;

        result
    }

    async fn handle_client_inner(
        &self,
        client_id: u64,
        peer: &str,
        client_stream: TcpStream,
    ) -> Result<()> {
        if let Err(e) = client_stream.set_nodelay(true) {
            debug!(client_id, error = %e, "Failed to set TCP_NODELAY on client connection");
        }

        let backend_stream = match self.backend.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                error!(
                    client_id,
                    backend = %self.backend.addr(),
                    error = %e,
                    "Failed to connect to backend"
                );
                self.audit(
                    LogEvent::error(e.to_string())
                        .with_client_id(client_id.to_string())
                        .with_peer(peer)
                        .with_backend(self.backend.addr()),
                )
                .await;
                // Dropping the stream closes the client connection
                return Err(e);
            }
        };

        let ctx = SessionContext::new(
            client_id,
            Arc::clone(&self.allow_list),
            Arc::clone(&self.pools),
        )
        .with_peer(peer)
        .with_audit(self.audit.clone());

        let summary = ProxySession::new(client_stream, backend_stream, ctx)
            .run()
            .await;

        match summary.commands {
            Some(stats) => debug!(
                client_id,
                peer,
                forwarded = stats.forwarded,
                blocked = stats.blocked,
                streams = stats.streams,
                stream_bytes = stats.stream_bytes,
                bytes_to_client = summary.bytes_to_client,
                "Session finished"
            ),
            None => debug!(
                client_id,
                peer,
                bytes_to_client = summary.bytes_to_client,
                "Session finished by backend"
            ),
        }

        Ok(())
    }
}
