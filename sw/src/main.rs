//! skipwatch - bypass stalled units of a recovery worker
//!
//! CLI entry point.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, error, info};

use skipwatch::cli::Cli;
use skipwatch::config::Config;
use skipwatch::{AttachmentKind, ChildSlot, Supervisor, spawn_termination_handler};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // stdout carries the worker's output, so logs go to a file
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skipwatch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("skipwatch.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let settings = config.settings(&cli).context("Invalid settings")?;
    debug!(?settings, worker = ?cli.worker, "main: resolved settings");

    // Registered before the worker exists so it is always covered
    let slot = ChildSlot::new();
    spawn_termination_handler(slot.clone()).context("Failed to install signal handlers")?;

    let kind = AttachmentKind::detect();
    info!(attachment = %kind, "skipwatch starting");

    let supervisor = Supervisor::new(settings, slot);
    match supervisor.run(&cli.worker, kind.attachment(settings.bypass_key)).await {
        Ok(Some(summary)) => info!(bypasses = summary.bypasses, "Worker finished"),
        Ok(None) => {
            info!("Worker finished, status stream was not fully interpreted");
            eprintln!("skipwatch: status stream was not fully interpreted, see the log for details");
        }
        Err(e) => {
            error!(phase = %e.phase(), error = %e, "Worker run failed");
            eprintln!("skipwatch: {}", e);
        }
    }

    Ok(())
}
