//! `cronhands run-once <job>`: execute one job now.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::bail;
use tracing::info;

use cronhands_config::Config;
use cronhands_core::Trigger;
use cronhands_daemon::SignalHandler;
use cronhands_runner::TaskRunner;
use cronhands_scheduler::{ActionExecutor, JobExecutor};

use crate::exit_status;

/// Run `job` through the same runner and log writer the scheduler uses.
///
/// The process exits with the run's recorded exit code (128+signal when the
/// task was signaled). SIGTERM/SIGINT stop the task and leave an interrupted
/// log. Fails without running when the daemon holds the job's lock.
pub(crate) async fn handle_run_once(config: Config, job_name: &str) -> anyhow::Result<ExitCode> {
    let Some(job) = config
        .scheduled_jobs()
        .into_iter()
        .find(|j| j.name == job_name)
    else {
        bail!("Unknown job '{}'", job_name);
    };

    let mut runner = TaskRunner::new(&config.paths.log_dir).with_kill_grace(config.daemon.kill_grace());
    if !config.logging.relay {
        runner = runner.without_relay();
    }
    let executor = ActionExecutor::new(Arc::new(runner));

    let signals = SignalHandler::new();
    signals.listen_os_signals()?;

    let record = executor
        .execute(&job, Trigger::Manual, signals.shutdown_token())
        .await?;

    info!(
        job = %record.job,
        run_id = %record.run_id,
        "Run finished: {} (exit code {:?})",
        record.status,
        record.exit_code
    );
    if let Some(path) = &record.log_path {
        println!("log: {}", path.display());
    }
    if let Some(message) = &record.message {
        println!("{}", message);
    }

    Ok(ExitCode::from(exit_status(record.exit_code.unwrap_or(1))))
}
