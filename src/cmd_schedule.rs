//! `cronhands schedule`: installed jobs and their next firings.

use std::process::ExitCode;

use chrono::Utc;

use cronhands_config::Config;
use cronhands_scheduler::{CronSpec, FileScheduleStore, ScheduleStore};

pub(crate) async fn handle_schedule(config: Config, count: usize) -> anyhow::Result<ExitCode> {
    let store = FileScheduleStore::new(config.schedule_file());
    let jobs = match store.load().await? {
        Some(schedule) => {
            println!(
                "Installed {} ({})",
                schedule.installed_at.format("%Y-%m-%d %H:%M:%S UTC"),
                store.path().display()
            );
            schedule.jobs
        }
        None => {
            println!("No schedule installed; showing configured jobs");
            config.scheduled_jobs()
        }
    };

    let now = Utc::now();
    for job in &jobs {
        let kind = if job.is_command() { "command" } else { "sweep" };
        println!("{:<24} {:<20} {}", job.name, job.schedule, kind);

        match CronSpec::parse(&job.schedule) {
            Ok(spec) => {
                for at in spec.upcoming(now, count) {
                    println!("    {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
                }
            }
            Err(e) => println!("    invalid schedule: {}", e),
        }
        if let Some(target) = &job.on_success {
            println!("    then {}", target);
        }
    }

    Ok(ExitCode::SUCCESS)
}
