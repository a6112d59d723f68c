//! Proxy session: one client connection paired with one backend connection
//!
//! A session runs two directions at the same time:
//! - client → backend: reads delimited commands, forwards allowed ones,
//!   answers the rest with a rejection, and relays INSTREAM chunks
//! - backend → client: copies backend responses verbatim
//!
//! The only signal between the two directions is connection closure. When
//! the client side ends, the backend connection is shut down and marked
//! closed, which stops the backend reader. When the backend side ends first,
//! the client side is closed under the command reader.

use crate::error::{Error, Result};
use crate::filter::{AllowList, is_instream_command};
use crate::logging::{AuditSink, LogEvent};
use crate::pool::BufferPools;
use crate::protocol::{REJECTION_RESPONSE, read_command, relay_chunks};
use futures::FutureExt;
use std::sync::Arc;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::conn_error::is_connection_closed;

/// Capacity of each buffered output stream
const OUTPUT_BUFFER_SIZE: usize = 64 * 1024;

/// Capacity of the client command reader
const INPUT_BUFFER_SIZE: usize = 64 * 1024;

/// Read buffer for backend responses
const BACKEND_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Flush client output once this many bytes are buffered
const CLIENT_FLUSH_WATERMARK: usize = 32 * 1024;

/// Client output shared by the response relay and the rejection path
type ClientOutput<W> = Arc<Mutex<BufWriter<W>>>;

/// State every session of a proxy shares read-only
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Connection number, for logs
    pub client_id: u64,
    /// Client peer address, for logs and audit events
    pub peer: String,
    /// Commands permitted to reach the backend
    pub allow_list: Arc<AllowList>,
    /// Buffer pools shared across sessions
    pub pools: Arc<BufferPools>,
    /// Optional JSONL audit log
    pub audit: Option<AuditSink>,
}

impl SessionContext {
    pub fn new(client_id: u64, allow_list: Arc<AllowList>, pools: Arc<BufferPools>) -> Self {
        Self {
            client_id,
            peer: String::new(),
            allow_list,
            pools,
            audit: None,
        }
    }

    /// Set the peer address
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    /// Set the audit log
    pub fn with_audit(mut self, audit: Option<AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Queue an event for the audit log, if configured
    ///
    /// The event is tagged with this session's client id and peer.
    pub async fn audit(&self, event: LogEvent) {
        if let Some(sink) = &self.audit {
            let mut event = event.with_client_id(self.client_id.to_string());
            if !self.peer.is_empty() {
                event = event.with_peer(self.peer.as_str());
            }
            sink.log(event).await;
        }
    }
}

/// Counters for the client → backend direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandStats {
    /// Commands forwarded to the backend
    pub forwarded: u64,
    /// Commands answered with a rejection
    pub blocked: u64,
    /// INSTREAM streams relayed to completion
    pub streams: u64,
    /// INSTREAM payload bytes relayed
    pub stream_bytes: u64,
}

/// Outcome of a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Bytes relayed from the backend to the client
    pub bytes_to_client: u64,
    /// Client → backend counters, unless that direction was cut off
    pub commands: Option<CommandStats>,
}

/// Why the backend → client copy stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendEnd {
    /// Backend sent end-of-stream
    Eof,
    /// The client side closed the backend connection
    Closed,
}

/// A proxy session between a client and a backend connection
pub struct ProxySession<C, B> {
    client: C,
    backend: B,
    ctx: SessionContext,
}

impl<C, B> ProxySession<C, B>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Create a session that exclusively owns both connections
    pub fn new(client: C, backend: B, ctx: SessionContext) -> Self {
        Self {
            client,
            backend,
            ctx,
        }
    }

    /// Relay in both directions until either side terminates
    pub async fn run(self) -> SessionSummary {
        let (client_rd, client_wr) = tokio::io::split(self.client);
        let (backend_rd, backend_wr) = tokio::io::split(self.backend);
        let client_out: ClientOutput<WriteHalf<C>> = Arc::new(Mutex::new(
            BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, client_wr),
        ));
        let (closed_tx, closed_rx) = watch::channel(false);

        let client_task = tokio::spawn(client_to_backend(
            self.ctx.clone(),
            client_rd,
            backend_wr,
            Arc::clone(&client_out),
            closed_tx,
        ));

        let client_side_closed = closed_rx.clone();
        let bytes_to_client = backend_to_client(&self.ctx, backend_rd, client_out, closed_rx).await;

        // The backend is gone; stop reading commands from the client.
        // Once the closed flag is set the client task only has to return.
        if !*client_side_closed.borrow() && !client_task.is_finished() {
            debug!(client_id = self.ctx.client_id, "Closing client side");
            client_task.abort();
        }
        let commands = match client_task.await {
            Ok(stats) => Some(stats),
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                warn!(client_id = self.ctx.client_id, error = %e, "Client relay task failed");
                None
            }
        };

        SessionSummary {
            bytes_to_client,
            commands,
        }
    }
}

/// Client → backend direction
///
/// Always closes the backend connection when it stops.
async fn client_to_backend<C, B>(
    ctx: SessionContext,
    client_rd: ReadHalf<C>,
    backend_wr: WriteHalf<B>,
    client_out: ClientOutput<WriteHalf<C>>,
    closed_tx: watch::Sender<bool>,
) -> CommandStats
where
    C: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let mut reader = BufReader::with_capacity(INPUT_BUFFER_SIZE, client_rd);
    let mut backend_out = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, backend_wr);
    let mut stats = CommandStats::default();

    let err = forward_commands(&ctx, &mut reader, &mut backend_out, &client_out, &mut stats)
        .await
        .err();

    match &err {
        Some(Error::Eof) | None => {
            debug!(client_id = ctx.client_id, "Client disconnected");
        }
        Some(e) if is_connection_closed(Some(e)) => {
            debug!(client_id = ctx.client_id, error = %e, "Client connection closed");
        }
        Some(e) => {
            warn!(
                client_id = ctx.client_id,
                peer = %ctx.peer,
                error = %e,
                "Error relaying client commands"
            );
            ctx.audit(LogEvent::error(e.to_string())).await;
        }
    }

    if let Err(e) = backend_out.shutdown().await {
        debug!(client_id = ctx.client_id, error = %e, "Error closing backend connection");
    }
    // The receiver is gone if the backend side already finished
    let _ = closed_tx.send(true);

    stats
}

/// Command loop; returns only when the connection can no longer be used
async fn forward_commands<R, W, CW>(
    ctx: &SessionContext,
    reader: &mut BufReader<R>,
    backend_out: &mut BufWriter<W>,
    client_out: &ClientOutput<CW>,
    stats: &mut CommandStats,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    CW: AsyncWrite + Unpin,
{
    loop {
        let command = read_command(reader, &ctx.pools.command).await?;
        let name = command.name_str();

        debug!(client_id = ctx.client_id, command = %name, "Command received");

        if !ctx.allow_list.is_command_allowed(&name) {
            info!(
                client_id = ctx.client_id,
                peer = %ctx.peer,
                command = %name,
                "Blocked command"
            );
            stats.blocked += 1;
            ctx.audit(LogEvent::command_blocked(name.as_ref())).await;

            let mut out = client_out.lock().await;
            out.write_all(REJECTION_RESPONSE).await?;
            out.flush().await?;
            continue;
        }

        // One command at a time: clamd answers each before reading the next
        backend_out.write_all(&command.encode()).await?;
        backend_out.flush().await?;
        stats.forwarded += 1;
        ctx.audit(LogEvent::command_allowed(name.as_ref())).await;

        if is_instream_command(&name) {
            debug!(client_id = ctx.client_id, "Processing INSTREAM data");
            let stream = relay_chunks(reader, backend_out, &ctx.pools.chunk).await?;
            stats.streams += 1;
            stats.stream_bytes += stream.bytes;
            ctx.audit(LogEvent::stream_completed(stream.chunks, stream.bytes))
                .await;
        }
    }
}

/// Backend → client direction
///
/// Returns the number of bytes relayed. The client output is always flushed
/// before returning.
async fn backend_to_client<R, W>(
    ctx: &SessionContext,
    mut backend_rd: R,
    client_out: ClientOutput<W>,
    mut closed_rx: watch::Receiver<bool>,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BACKEND_READ_BUFFER_SIZE];
    let mut total = 0u64;

    let result = copy_to_client(
        &mut backend_rd,
        &client_out,
        &mut buf,
        &mut closed_rx,
        &mut total,
    )
    .await;

    if let Err(e) = client_out.lock().await.flush().await {
        debug!(client_id = ctx.client_id, error = %e, "Error flushing final buffer to client");
    }

    match result {
        Ok(BackendEnd::Eof) => {
            debug!(client_id = ctx.client_id, bytes = total, "Backend closed connection");
        }
        Ok(BackendEnd::Closed) => {
            debug!(client_id = ctx.client_id, bytes = total, "Backend connection closed");
        }
        Err(e) if is_connection_closed(Some(&e)) => {
            debug!(client_id = ctx.client_id, error = %e, "Backend connection closed");
        }
        Err(e) => {
            warn!(
                client_id = ctx.client_id,
                peer = %ctx.peer,
                error = %e,
                "Error copying from backend to client"
            );
            ctx.audit(LogEvent::error(e.to_string())).await;
        }
    }

    total
}

async fn copy_to_client<R, W>(
    backend_rd: &mut R,
    client_out: &ClientOutput<W>,
    buf: &mut [u8],
    closed_rx: &mut watch::Receiver<bool>,
    total: &mut u64,
) -> Result<BackendEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let n = match backend_rd.read(buf).now_or_never() {
            Some(res) => res?,
            None => {
                // Nothing pending from the backend: push out what we have
                client_out.lock().await.flush().await?;
                tokio::select! {
                    res = backend_rd.read(buf) => res?,
                    _ = closed_rx.wait_for(|closed| *closed) => return Ok(BackendEnd::Closed),
                }
            }
        };

        if n == 0 {
            return Ok(BackendEnd::Eof);
        }

        let mut out = client_out.lock().await;
        out.write_all(&buf[..n]).await?;
        *total += n as u64;

        if out.buffer().len() > CLIENT_FLUSH_WATERMARK {
            out.flush().await?;
        }
    }
}
