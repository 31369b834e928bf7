//! `cronhands status [job]`: recent runs read back from run logs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use glob::Pattern;

use cronhands_config::Config;
use cronhands_runner::{is_process_running, parse_footer, parse_header, JobLock, TaskRunner};

/// One run as recorded in its log.
struct RunLine {
    path: PathBuf,
    started: String,
    outcome: String,
}

pub(crate) fn handle_status(config: Config, job: Option<&str>, limit: usize) -> anyhow::Result<ExitCode> {
    let names: Vec<String> = match job {
        Some(job) => vec![job.to_string()],
        None => config
            .scheduled_jobs()
            .into_iter()
            .filter(|j| j.is_command())
            .map(|j| j.name)
            .collect(),
    };

    let lock_dir = TaskRunner::new(&config.paths.log_dir).lock_dir();
    for name in &names {
        let owner = JobLock::read_owner(&JobLock::path_for(&lock_dir, name))
            .filter(|pid| is_process_running(*pid));
        match owner {
            Some(pid) => println!("{} (running, pid {})", name, pid),
            None => println!("{}", name),
        }

        let runs = recent_runs(&config.paths.log_dir, name, limit, owner.is_some())?;
        if runs.is_empty() {
            println!("    no runs");
        }
        for run in runs {
            let file = run
                .path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("    {:<24} {:<32} {}", run.started, run.outcome, file);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Newest first. Log names sort chronologically; logs of other jobs that
/// share the name prefix are skipped by their header.
fn recent_runs(
    log_dir: &Path,
    job: &str,
    limit: usize,
    running: bool,
) -> anyhow::Result<Vec<RunLine>> {
    let pattern = format!(
        "{}/{}_*.log",
        Pattern::escape(&log_dir.to_string_lossy()),
        Pattern::escape(job)
    );
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();
    paths.sort();

    let mut runs = Vec::new();
    for path in paths.into_iter().rev() {
        if runs.len() >= limit {
            break;
        }
        let Some(header) = parse_header(&path)? else {
            continue;
        };
        if header.job != job {
            continue;
        }

        let outcome = match parse_footer(&path)? {
            Some(footer) => {
                let mut outcome = format!("{}", footer.status);
                if let Some(code) = footer.exit_code {
                    outcome.push_str(&format!(" exit={}", code));
                }
                outcome.push_str(&format!(" {:.1}s", footer.duration.as_secs_f64()));
                if footer.interrupted {
                    outcome.push_str(" interrupted");
                }
                outcome
            }
            // only the newest log can belong to a live run
            None if running && runs.is_empty() => "running".to_string(),
            None => "incomplete".to_string(),
        };

        runs.push(RunLine {
            path,
            started: header.started.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            outcome,
        });
    }

    Ok(runs)
}
