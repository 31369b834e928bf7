//! `cronhands validate`: config and schedule checks without starting anything.

use std::path::Path;
use std::process::ExitCode;

use chrono::Utc;

use cronhands_config::{Config, ConfigValidator};
use cronhands_scheduler::ScheduleTable;

/// Runs the same checks the supervisor runs at startup.
pub(crate) fn handle_validate(config_path: &Path, config: Config) -> anyhow::Result<ExitCode> {
    let result = ConfigValidator::validate(&config);
    for warning in &result.warnings {
        println!("warning: {}", warning);
    }
    for error in &result.errors {
        println!("error: {}", error);
    }

    let mut valid = result.is_valid();
    if valid {
        if let Err(e) = ScheduleTable::validate(config.scheduled_jobs(), Utc::now()) {
            println!("error: {}", e);
            valid = false;
        }
    }

    if !valid {
        return Ok(ExitCode::FAILURE);
    }
    println!("{}: {} jobs OK", config_path.display(), config.jobs.len());
    Ok(ExitCode::SUCCESS)
}
