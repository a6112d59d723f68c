//! JSONL (JSON Lines) audit log
//!
//! One JSON object per line for every connection and command decision made
//! by the proxy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Log event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    /// Proxy started listening
    ProxyStart,
    /// Proxy stopped
    ProxyStop,
    /// Client connected
    ClientConnect,
    /// Client disconnected
    ClientDisconnect,
    /// Command forwarded to the backend
    CommandAllowed,
    /// Command rejected
    CommandBlocked,
    /// INSTREAM stream relayed to its terminator
    StreamCompleted,
    /// Error occurred
    Error,
}

impl std::fmt::Display for LogEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogEventKind::ProxyStart => write!(f, "proxy_start"),
            LogEventKind::ProxyStop => write!(f, "proxy_stop"),
            LogEventKind::ClientConnect => write!(f, "client_connect"),
            LogEventKind::ClientDisconnect => write!(f, "client_disconnect"),
            LogEventKind::CommandAllowed => write!(f, "command_allowed"),
            LogEventKind::CommandBlocked => write!(f, "command_blocked"),
            LogEventKind::StreamCompleted => write!(f, "stream_completed"),
            LogEventKind::Error => write!(f, "error"),
        }
    }
}

/// Decision taken for a command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Command was forwarded
    Allowed,
    /// Command was rejected
    Denied,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allowed => write!(f, "allowed"),
            Decision::Denied => write!(f, "denied"),
        }
    }
}

/// A structured log event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Timestamp of the event
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Kind of event
    pub kind: LogEventKind,

    /// Listen address of the proxy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,

    /// Backend daemon address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Client identifier (connection number)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Client peer address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,

    /// Command as sent by the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Decision for the command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    /// Number of chunks in a relayed stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<u64>,

    /// Number of payload bytes in a relayed stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,

    /// Error message (for error events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEvent {
    /// Create a new log event with the current timestamp
    pub fn new(kind: LogEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            listen: None,
            backend: None,
            client_id: None,
            peer: None,
            command: None,
            decision: None,
            chunks: None,
            bytes: None,
            error: None,
        }
    }

    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = Some(listen.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Create a proxy start event
    pub fn proxy_start(listen: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::new(LogEventKind::ProxyStart)
            .with_listen(listen)
            .with_backend(backend)
    }

    /// Create a proxy stop event
    pub fn proxy_stop(listen: impl Into<String>) -> Self {
        Self::new(LogEventKind::ProxyStop).with_listen(listen)
    }

    /// Create a client connect event
    pub fn client_connect(client_id: impl Into<String>, peer: impl Into<String>) -> Self {
        Self::new(LogEventKind::ClientConnect)
            .with_client_id(client_id)
            .with_peer(peer)
    }

    /// Create a client disconnect event
    pub fn client_disconnect(client_id: impl Into<String>, peer: impl Into<String>) -> Self {
        Self::new(LogEventKind::ClientDisconnect)
            .with_client_id(client_id)
            .with_peer(peer)
    }

    /// Create a forwarded command event
    pub fn command_allowed(command: impl Into<String>) -> Self {
        Self::new(LogEventKind::CommandAllowed)
            .with_command(command)
            .with_decision(Decision::Allowed)
    }

    /// Create a rejected command event
    pub fn command_blocked(command: impl Into<String>) -> Self {
        Self::new(LogEventKind::CommandBlocked)
            .with_command(command)
            .with_decision(Decision::Denied)
    }

    /// Create a completed stream event
    pub fn stream_completed(chunks: u64, bytes: u64) -> Self {
        let mut event = Self::new(LogEventKind::StreamCompleted);
        event.chunks = Some(chunks);
        event.bytes = Some(bytes);
        event
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Error).with_error(message)
    }

    /// Serialize the event to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSONL file writer with thread-safe buffered output
#[derive(Debug)]
pub struct JsonlWriter {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlWriter {
    /// Create a new JSONL writer
    ///
    /// Opens the file for appending. Creates the file and its parent
    /// directory if they don't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Write a log event to the file
    pub fn write(&self, event: &LogEvent) -> std::io::Result<()> {
        self.write_batch(std::slice::from_ref(event))
    }

    /// Write events in order, flushing once after the last one
    pub fn write_batch(&self, events: &[LogEvent]) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;

        for event in events {
            let json = event
                .to_json()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()
    }

    /// Flush any buffered data to the file
    pub fn flush(&self) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;

        writer.flush()
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        // Best effort flush on drop
        let _ = self.flush();
    }
}
