//! `cronhands sweep [job]`: one-off retention sweeps.

use std::process::ExitCode;

use anyhow::bail;
use chrono::Utc;

use cronhands_config::Config;
use cronhands_core::JobAction;
use cronhands_retention::RetentionSweeper;

/// Run every sweep job (or only `job`) once and print each report.
///
/// Exits 1 if any entry could not be removed.
pub(crate) async fn handle_sweep(config: Config, job: Option<&str>) -> anyhow::Result<ExitCode> {
    let policies: Vec<_> = config
        .scheduled_jobs()
        .into_iter()
        .filter(|j| job.is_none_or(|name| j.name == name))
        .filter_map(|j| match j.action {
            JobAction::Sweep { policy } => Some((j.name, policy)),
            JobAction::Command { .. } => None,
        })
        .collect();

    if policies.is_empty() {
        match job {
            Some(name) => bail!("No sweep job named '{}'", name),
            None => {
                println!("No sweep jobs configured");
                return Ok(ExitCode::SUCCESS);
            }
        }
    }

    let sweeper = RetentionSweeper::default();
    let now = Utc::now();
    let mut clean = true;

    for (name, policy) in policies {
        let report = {
            let sweeper = sweeper.clone();
            tokio::task::spawn_blocking(move || sweeper.sweep(&policy, now)).await?
        };

        println!("{}: {}", name, report);
        for path in &report.deleted_paths {
            println!("    deleted {}", path.display());
        }
        for e in &report.errors {
            println!("    error: {}", e);
        }
        clean &= report.is_clean();
    }

    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
