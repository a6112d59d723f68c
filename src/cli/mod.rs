//! CLI module for clamd-filter
//!
//! This module provides the command-line interface using clap derive macros.

pub mod args;
pub mod commands;
pub mod exit_code;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogLevel;
use args::{CompletionArgs, ConfigArgs, RunArgs, VersionArgs};

/// Filtering proxy for the clamd protocol
#[derive(Parser, Debug)]
#[command(name = "clamd-filter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, global = true, env = "CLAMD_FILTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Minimum log level (overridden by RUST_LOG)
    #[arg(long, global = true, value_enum, env = "CLAMD_FILTER_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the proxy in the foreground
    Run(RunArgs),

    /// Show or validate configuration
    Config(ConfigArgs),

    /// Show version information
    Version(VersionArgs),

    /// Generate shell completions
    Completion(CompletionArgs),
}
