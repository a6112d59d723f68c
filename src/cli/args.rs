//! Argument structures for CLI commands

use clap::{Args, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Arguments for the `run` command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Address to listen on for clients (host:port)
    ///
    /// Defaults to 127.0.0.1:3310
    #[arg(short, long, env = "CLAMD_FILTER_LISTEN", value_name = "ADDR")]
    pub listen: Option<String>,

    /// Address of the backend clamd daemon (host:port)
    ///
    /// Defaults to 127.0.0.1:3311
    #[arg(short, long, env = "CLAMD_FILTER_BACKEND", value_name = "ADDR")]
    pub backend: Option<String>,

    /// Timeout for connecting to the backend (e.g. 10s, 1m)
    #[arg(long, value_name = "DURATION")]
    pub connect_timeout: Option<String>,

    /// Path to JSONL audit log file
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,
}

/// Output format for the `config` command
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Json,
}

/// Arguments for the `config` command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Show configuration search paths
    #[arg(long)]
    pub paths: bool,

    /// Show an example configuration
    #[arg(long, conflicts_with = "paths")]
    pub example: bool,

    /// Validate configuration only
    #[arg(long, conflicts_with_all = ["paths", "example"])]
    pub validate: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = ConfigFormat::Toml)]
    pub format: ConfigFormat,
}

/// Arguments for the `version` command
#[derive(Args, Debug, Clone)]
pub struct VersionArgs {
    /// Show build details
    #[arg(short, long)]
    pub verbose: bool,
}

/// Arguments for the `completion` command
#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
