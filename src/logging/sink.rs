//! Background audit log writer
//!
//! Sessions hand events to an [`AuditSink`]. A single task drains the queue
//! and performs the file I/O on the blocking pool.

use super::jsonl::{JsonlWriter, LogEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Queue depth between sessions and the writer task
const CHANNEL_BUFFER: usize = 1024;

/// Upper bound on events written per blocking call
const MAX_BATCH: usize = 64;

/// Cloneable handle for queueing audit events
#[derive(Debug, Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<LogEvent>,
}

impl AuditSink {
    /// Spawn the writer task for `writer`
    ///
    /// The task exits once every clone of the returned sink has been
    /// dropped and the queue is drained.
    pub fn start(writer: JsonlWriter) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let handle = tokio::spawn(run_writer_loop(Arc::new(writer), rx));
        (Self { tx }, handle)
    }

    /// Queue an event for writing
    ///
    /// Waits for room when the queue is full. Events sent after the writer
    /// task has stopped are dropped with a warning.
    pub async fn log(&self, event: LogEvent) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event).await {
            warn!(kind = %event.kind, "Audit log writer stopped, event dropped");
        }
    }
}

async fn run_writer_loop(writer: Arc<JsonlWriter>, mut rx: mpsc::Receiver<LogEvent>) {
    let mut batch = Vec::with_capacity(MAX_BATCH);

    while rx.recv_many(&mut batch, MAX_BATCH).await > 0 {
        let events = std::mem::take(&mut batch);
        let writer = Arc::clone(&writer);

        match tokio::task::spawn_blocking(move || writer.write_batch(&events)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to write audit log events"),
            Err(e) => warn!(error = %e, "Audit log write task failed"),
        }
    }

    debug!("Audit log writer stopped");
}
