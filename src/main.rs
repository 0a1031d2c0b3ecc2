use clap::Parser;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod cli;
mod commands;
mod config;
mod confirm;
mod daemon;
mod dispatch;
mod event;
mod hook;
mod registry;
mod rules;
mod watch;

use cli::{Cli, Commands, OutputFormat};
use config::{Config, LogLevel};

fn setup_logging(log_level: &LogLevel) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pelagos")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("pelagos.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG env var takes precedence, otherwise use config log_level
    let mut builder = env_logger::Builder::new();

    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(log_level.as_filter());
    }

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    info!(
        "Log level: {} (from {})",
        log_level.as_filter(),
        if std::env::var("RUST_LOG").is_ok() { "RUST_LOG env" } else { "config" }
    );
    Ok(())
}

fn run(cli: Cli, config: Config, config_path: Option<PathBuf>) -> Result<()> {
    let verbose = cli.verbose;
    match cli.command {
        Commands::Run { watch_dir } => commands::run::run(watch_dir, config, config_path),
        Commands::Check { format } => {
            commands::check::run(OutputFormat::resolve(format), verbose, &config, config_path.as_ref())
        }
        Commands::Resolve { path, url, format } => {
            commands::resolve::run(path, url, OutputFormat::resolve(format), verbose, &config)
        }
        Commands::Hook { action } => commands::hook::run(action),
        Commands::Notify {
            command,
            hash,
            name,
            port,
        } => commands::notify::run(command, hash, name, port.unwrap_or(config.port)),
        Commands::Present { action } => commands::present::run(action),
        Commands::Doctor => commands::doctor::run(&config, config_path.as_ref()),
        Commands::Completions { shell } => commands::completions::run(shell),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments first
    let cli = Cli::parse();

    // Load configuration (before logging, so log messages in Config::load are silent)
    let (config, config_path) =
        Config::locate_and_load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with log level from config (or RUST_LOG env var)
    setup_logging(&config.log_level).context("Failed to setup logging")?;

    info!("Starting pelagos with config from: {:?}", config_path);

    // Run the command
    run(cli, config, config_path).context("Command failed")?;

    Ok(())
}
