//! Logging module for clamd-filter
//!
//! This module provides logging functionality using tracing and tracing-subscriber.
//! It supports:
//! - A configurable minimum level (`--log-level`, overridable with `RUST_LOG`)
//! - Stderr output for human-readable logs
//! - A JSONL audit log of connections and command decisions, written by a
//!   background task

pub mod jsonl;
pub mod sink;

pub use jsonl::{Decision, JsonlWriter, LogEvent, LogEventKind};
pub use sink::AuditSink;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Minimum log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    fn as_level(self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Minimum level when `RUST_LOG` is not set
    pub level: LogLevel,
}

impl LogConfig {
    /// Create a new log configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Get the minimum log level
    fn min_level(&self) -> Level {
        self.level.as_level()
    }
}

/// Initialize the logging subsystem
///
/// Fails if a global subscriber is already installed.
pub fn init(config: LogConfig) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    // Allow overriding via RUST_LOG environment variable
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.min_level().into())
        .from_env_lossy();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    tracing::subscriber::set_global_default(subscriber)
}
