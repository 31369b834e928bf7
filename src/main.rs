//! cronhands - cron-scheduled job runner.
//!
//! Main entry point for the cronhands CLI and supervisor.

mod cli;
mod cmd_health;
mod cmd_run;
mod cmd_run_once;
mod cmd_schedule;
mod cmd_status;
mod cmd_sweep;
mod cmd_validate;

use std::path::Path;
use std::process::ExitCode;
use std::sync::OnceLock;

use anyhow::Context;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cronhands_config::{Config, ConfigLoader};

use crate::cli::{Cli, Commands};

/// Level for commands whose output is the point, so logs stay out of the way.
const QUIET_LEVEL: &str = "warn";

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins over `level`. With `file_dir` set the daemon also writes
/// its own daily log there (`cronhands.<date>.log`), which never matches a
/// job's `<job>_*.log` pattern.
fn init_tracing(level: &str, json: bool, file_dir: Option<&Path>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("cronhands")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            static GUARD: OnceLock<WorkerGuard> = OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    // Console goes to stderr; stdout carries relayed run output and command results.
    let (text_layer, json_layer) = if json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (
            Some(fmt::layer().with_target(true).with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    ConfigLoader::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

/// Map a recorded exit code (0-255, 128+signal) onto a process exit status.
pub(crate) fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli.config)?;
    let logging = config.logging.clone();

    match cli.command {
        Commands::Run => {
            let file_dir = logging.file.then_some(config.paths.log_dir.as_path());
            init_tracing(&logging.level, logging.json, file_dir)?;
            cmd_run::handle_run(cli.config, config).await
        }
        Commands::RunOnce { job } => {
            init_tracing(&logging.level, logging.json, None)?;
            cmd_run_once::handle_run_once(config, &job).await
        }
        Commands::Sweep { job } => {
            init_tracing(&logging.level, logging.json, None)?;
            cmd_sweep::handle_sweep(config, job.as_deref()).await
        }
        Commands::Health { timeout, json } => {
            init_tracing(QUIET_LEVEL, logging.json, None)?;
            cmd_health::handle_health(config, timeout, json).await
        }
        Commands::Schedule { count } => {
            init_tracing(QUIET_LEVEL, logging.json, None)?;
            cmd_schedule::handle_schedule(config, count).await
        }
        Commands::Status { job, limit } => {
            init_tracing(QUIET_LEVEL, logging.json, None)?;
            cmd_status::handle_status(config, job.as_deref(), limit)
        }
        Commands::Validate => {
            init_tracing(QUIET_LEVEL, logging.json, None)?;
            cmd_validate::handle_validate(&cli.config, config)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
