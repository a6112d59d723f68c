//! Configuration module for clamd-filter
//!
//! This module handles loading and parsing of configuration files,
//! including environment variable expansion and duration parsing.

mod file;

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use file::{
    ConfigFile, ConfigPath, config_search_paths, find_config_file, load_config,
    load_config_from_path_or_default,
};

/// Default address the proxy listens on
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3310";

/// Default address of the backend clamd daemon
pub const DEFAULT_BACKEND: &str = "127.0.0.1:3311";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address to accept client connections on (`host:port`)
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Address of the backend clamd daemon (`host:port`)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Timeout for connecting to the backend
    /// Format: "10s", "1m", etc.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Minimum log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Path to the JSONL audit log
    /// Supports environment variable and tilde expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backend: default_backend(),
            connect_timeout: default_connect_timeout(),
            log_level: LogLevel::default(),
            log_path: None,
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

impl Config {
    /// Expand paths and parse durations
    pub fn expand(&self) -> crate::Result<ExpandedConfig> {
        if self.listen.trim().is_empty() {
            return Err(crate::Error::Config("listen address is empty".to_string()));
        }
        if self.backend.trim().is_empty() {
            return Err(crate::Error::Config("backend address is empty".to_string()));
        }

        let log_path = self.log_path.as_ref().map(|p| expand_path(p)).transpose()?;

        Ok(ExpandedConfig {
            listen: self.listen.clone(),
            backend: self.backend.clone(),
            connect_timeout: parse_duration(&self.connect_timeout)?,
            log_level: self.log_level,
            log_path: log_path.map(PathBuf::from),
        })
    }
}

/// Configuration with paths expanded and durations parsed
#[derive(Debug, Clone)]
pub struct ExpandedConfig {
    /// Listen address
    pub listen: String,

    /// Backend address
    pub backend: String,

    /// Backend connect timeout
    pub connect_timeout: Duration,

    /// Minimum log level
    pub log_level: LogLevel,

    /// Resolved path to the audit log
    pub log_path: Option<PathBuf>,
}

/// Expand environment variables and tilde in a path string
pub fn expand_path(path: &str) -> crate::Result<String> {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .map_err(|e| crate::Error::Config(format!("Failed to expand path '{}': {}", path, e)))
}

/// Parse a duration string like "10s", "5m", "1h", "1d"
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::Config("Empty duration string".to_string()));
    }

    // Find the position where the numeric part ends
    let (num_str, unit) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| (&s[..i], &s[i..]))
        .unwrap_or((s, "s"));

    let num: u64 = num_str.trim().parse().map_err(|e| {
        crate::Error::Config(format!("Invalid duration number '{}': {}", num_str, e))
    })?;

    let duration = match unit.to_lowercase().as_str() {
        "ms" | "msec" | "millis" => Duration::from_millis(num),
        "s" | "sec" | "secs" | "second" | "seconds" => Duration::from_secs(num),
        "m" | "min" | "mins" | "minute" | "minutes" => Duration::from_secs(num * 60),
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::from_secs(num * 60 * 60),
        "d" | "day" | "days" => Duration::from_secs(num * 60 * 60 * 24),
        _ => {
            return Err(crate::Error::Config(format!(
                "Unknown duration unit '{}' in '{}'",
                unit, s
            )));
        }
    };

    if duration.is_zero() {
        return Err(crate::Error::Config(format!(
            "Duration must be greater than zero: '{}'",
            s
        )));
    }

    Ok(duration)
}
