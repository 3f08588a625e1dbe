//! dapline - drive one debug adapter session from the command line

mod commands;
mod console;

use clap::{Parser, Subcommand};
use dapline_config::{load_config, Config};
use dapline_logging::{init, init_with_file, LogConfig, WorkerGuard};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "dapline", version, about = "Debug Adapter Protocol client")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "DAPLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a debug session and stream its output until it ends
    Run(commands::run::RunArgs),
}

fn load(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(Config::default()),
    }
}

fn init_logging(config: &Config, debug: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let log_config = LogConfig::from_settings(&config.logging).debug(debug);
    match &config.logging.file {
        Some(path) => Ok(Some(init_with_file(log_config, path)?)),
        None => {
            init(log_config);
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = match init_logging(&config, cli.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Run(args) => commands::run::run(args, config).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            dapline_logging::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
