//! `cronhands run`: the container entrypoint.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};

use cronhands_config::Config;
use cronhands_daemon::Supervisor;

/// Run the supervisor in the foreground until SIGTERM/SIGINT.
///
/// Exits 0 on clean shutdown and 1 when startup fails (PID file held,
/// invalid config, schedule install error).
pub(crate) async fn handle_run(config_path: PathBuf, config: Config) -> anyhow::Result<ExitCode> {
    info!("Starting cronhands v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Config {}: {} jobs, logs in {}",
        config_path.display(),
        config.jobs.len(),
        config.paths.log_dir.display()
    );

    let supervisor = Supervisor::new(config_path, config);
    match supervisor.run().await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!("cronhands stopped with error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
