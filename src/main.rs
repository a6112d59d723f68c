//! clamd-filter - filtering proxy for the clamd protocol

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::env::CompleteEnv;

use clamd_filter::cli::exit_code::ExitCode;
use clamd_filter::cli::{Cli, Commands, commands};
use clamd_filter::config::load_config_from_path_or_default;
use clamd_filter::logging::{self, LogConfig, LogLevel};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Handle dynamic shell completion if COMPLETE env var is set
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(()) => ExitCode::Success.into(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from_error(&e).into()
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => {
            let config_file = load_config_from_path_or_default(cli.config.as_deref())?;
            init_logging(cli.log_level.unwrap_or(config_file.config.log_level));
            commands::run::execute(args, config_file.config).await
        }
        Commands::Config(args) => {
            init_logging(cli.log_level.unwrap_or_default());
            commands::config::execute(args, cli.config.as_deref())
        }
        Commands::Version(args) => {
            commands::version::print_version(args.verbose);
            Ok(())
        }
        Commands::Completion(args) => {
            commands::completion::execute(args);
            Ok(())
        }
    }
}

/// Initialize logging with tracing-subscriber
fn init_logging(level: LogLevel) {
    if let Err(e) = logging::init(LogConfig::new().with_level(level)) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }
}
