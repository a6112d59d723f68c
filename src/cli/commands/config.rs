//! Config command - show or validate configuration

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::args::{ConfigArgs, ConfigFormat};
use crate::config::{Config, config_search_paths, load_config_from_path_or_default};

/// Example configuration content
pub fn example_config() -> &'static str {
    r#"# clamd-filter configuration file

# Address to accept client connections on
listen = "127.0.0.1:3310"

# Address of the backend clamd daemon
backend = "127.0.0.1:3311"

# How long to wait when connecting to the backend
connect_timeout = "10s"

# Minimum log level: debug, info, warn, error
# RUST_LOG takes precedence when set
log_level = "warn"

# JSONL audit log of connections and command decisions
# log_path = "$XDG_STATE_HOME/clamd-filter/audit.jsonl"

# Only PING, VERSION, VERSIONCOMMANDS and INSTREAM (with optional z/n
# prefix) reach the backend. Everything else is answered with
# "ERROR: Command not allowed".
"#
}

/// Execute the config command
pub fn execute(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    if args.paths {
        println!("Config search paths (in priority order):");
        for (i, cp) in config_search_paths().iter().enumerate() {
            let exists = if cp.path.exists() {
                "\x1b[32m[exists]\x1b[0m"
            } else {
                ""
            };
            println!("  {}. {} {}", i + 1, cp.description, exists);
            println!("     {}", cp.path.display());
        }
        return Ok(());
    }

    if args.example {
        match args.format {
            ConfigFormat::Json => {
                let config: Config =
                    toml::from_str(example_config()).context("Failed to parse example config")?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigFormat::Toml => print!("{}", example_config()),
        }
        return Ok(());
    }

    let config_file = load_config_from_path_or_default(config_path)?;
    let from_file = !config_file.path.as_os_str().is_empty();

    if args.validate {
        config_file.config.expand()?;
        if from_file {
            println!("Configuration file is valid: {}", config_file.path.display());
        } else {
            println!("No configuration file found, built-in defaults are valid");
        }
        return Ok(());
    }

    if from_file {
        println!("# Configuration from: {}", config_file.path.display());
    } else {
        println!("# No configuration file found, showing built-in defaults");
        println!("# Use 'config --paths' to see search locations");
    }
    println!();
    print!("{}", render(&config_file.config, args.format)?);

    Ok(())
}

/// Render the effective configuration
fn render(config: &Config, format: ConfigFormat) -> Result<String> {
    match format {
        ConfigFormat::Json => Ok(serde_json::to_string_pretty(config)? + "\n"),
        ConfigFormat::Toml => {
            toml::to_string_pretty(config).context("Failed to serialize configuration")
        }
    }
}
