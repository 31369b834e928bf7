//! Liveness probe.
//!
//! Answers "is the scheduler alive and doing its job" from evidence on disk
//! only: the installed schedule, the supervisor PID file and the run logs of
//! the probed job. It never writes anything, so it can run as a separate
//! short-lived process (`cronhands health`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cronhands_config::Config;
use cronhands_runner::is_run_log_of;
use cronhands_scheduler::{CronSpec, FileScheduleStore, ScheduleStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::pid::PidFile;

/// Outcome of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The probed job has a log at least as new as its last due firing.
    Healthy,
    /// No run for the last due firing, but the supervisor started after it,
    /// so none was expected.
    Starting,
    Unhealthy,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Healthy => write!(f, "healthy"),
            ProbeStatus::Starting => write!(f, "starting"),
            ProbeStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub status: ProbeStatus,
    pub job: Option<String>,
    pub reason: String,
    /// Newest log of the probed job.
    pub last_log: Option<PathBuf>,
    pub last_log_at: Option<DateTime<Utc>>,
}

impl ProbeReport {
    fn unhealthy(job: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Unhealthy,
            job: job.map(str::to_string),
            reason: reason.into(),
            last_log: None,
            last_log_at: None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, ProbeStatus::Healthy | ProbeStatus::Starting)
    }
}

impl std::fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.reason)
    }
}

/// Why a probe could not reach a verdict. Callers treat all of these as
/// unhealthy.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read schedule: {0}")]
    Store(#[from] StoreError),

    #[error("PID file error: {0}")]
    PidFile(String),

    #[error("Probe task failed: {0}")]
    Task(String),
}

/// What the filesystem scan found.
struct Evidence {
    newest_log: Option<(PathBuf, DateTime<Utc>)>,
    output: OutputState,
}

enum OutputState {
    NotConfigured,
    Missing,
    Empty,
    Present,
}

/// Side-effect free liveness check.
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    log_dir: PathBuf,
    schedule_file: PathBuf,
    pid_file: Option<PathBuf>,
    job: Option<String>,
    grace: Duration,
    output_dir: Option<PathBuf>,
}

impl LivenessProbe {
    pub fn new(log_dir: impl Into<PathBuf>, schedule_file: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            schedule_file: schedule_file.into(),
            pid_file: None,
            job: None,
            grace: Duration::from_secs(300),
            output_dir: None,
        }
    }

    /// Probe configured from the `[paths]` and `[health]` sections.
    pub fn from_config(config: &Config) -> Self {
        let mut probe = Self::new(&config.paths.log_dir, config.schedule_file())
            .with_grace(config.health.grace());
        if config.daemon.pid_file {
            probe = probe.with_pid_file(config.pid_file());
        }
        if let Some(job) = config.health_job() {
            probe = probe.with_job(job);
        }
        if let Some(dir) = &config.health.output_dir {
            probe = probe.with_output_dir(dir);
        }
        probe
    }

    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = Some(path.into());
        self
    }

    /// Job whose logs count as evidence. Defaults to the first installed
    /// command job.
    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// [`check`](Self::check) bounded by `timeout`.
    pub async fn check_with_timeout(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<ProbeReport, ProbeError> {
        tokio::time::timeout(timeout, self.check(now))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
    }

    /// Evaluate liveness at `now`.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<ProbeReport, ProbeError> {
        let store = FileScheduleStore::new(&self.schedule_file);
        let Some(schedule) = store.load().await? else {
            return Ok(ProbeReport::unhealthy(None, "no schedule installed"));
        };

        let job_name = match &self.job {
            Some(job) => Some(job.clone()),
            None => schedule
                .jobs
                .iter()
                .find(|j| j.is_command())
                .map(|j| j.name.clone()),
        };
        let Some(job_name) = job_name else {
            return Ok(ProbeReport::unhealthy(None, "no command job installed"));
        };
        let job = Some(job_name.as_str());

        let Some(installed) = schedule.job(&job_name) else {
            return Ok(ProbeReport::unhealthy(
                job,
                format!("job '{}' is not installed", job_name),
            ));
        };
        let spec = match CronSpec::parse(&installed.schedule) {
            Ok(spec) => spec,
            Err(e) => {
                return Ok(ProbeReport::unhealthy(
                    job,
                    format!("invalid schedule '{}': {}", installed.schedule, e),
                ));
            }
        };
        // a firing counts as missed once it is more than `grace` in the past
        let due = chrono::Duration::from_std(self.grace)
            .ok()
            .and_then(|grace| now.checked_sub_signed(grace))
            .and_then(|cutoff| spec.prev_before(cutoff));

        let started = match &self.pid_file {
            Some(path) => {
                let pid = PidFile::new(path);
                if pid.owner_alive().map_err(|e| ProbeError::PidFile(e.to_string()))?
                    == Some(false)
                {
                    return Ok(ProbeReport::unhealthy(job, "supervisor is not running"));
                }
                pid.started_at()
                    .map_err(|e| ProbeError::PidFile(e.to_string()))?
            }
            None => None,
        };

        let evidence = {
            let log_dir = self.log_dir.clone();
            let output_dir = self.output_dir.clone();
            let name = job_name.clone();
            tokio::task::spawn_blocking(move || scan(&log_dir, &name, output_dir.as_deref()))
                .await
                .map_err(|e| ProbeError::Task(e.to_string()))??
        };
        debug!(
            job = %job_name,
            "Last due firing {:?}, newest log {:?}",
            due,
            evidence.newest_log
        );

        let covers_due = |at: DateTime<Utc>| due.is_none_or(|due| at >= due);

        let (last_log, last_log_at) = match evidence.newest_log {
            Some((path, at)) => (Some(path), Some(at)),
            None => (None, None),
        };
        let mut report = ProbeReport {
            status: ProbeStatus::Unhealthy,
            job: Some(job_name.clone()),
            reason: String::new(),
            last_log,
            last_log_at,
        };

        match (last_log_at, started) {
            (Some(at), _) if covers_due(at) => {
                report.status = ProbeStatus::Healthy;
                report.reason = format!("last run log at {}", at.to_rfc3339());
                match evidence.output {
                    OutputState::Missing => {
                        report.status = ProbeStatus::Unhealthy;
                        report.reason = "output directory is missing".to_string();
                    }
                    OutputState::Empty => {
                        report.status = ProbeStatus::Unhealthy;
                        report.reason = "output directory is empty".to_string();
                    }
                    OutputState::NotConfigured | OutputState::Present => {}
                }
            }
            (_, Some(start)) if covers_due(start) => {
                report.status = ProbeStatus::Starting;
                report.reason = format!(
                    "supervisor started at {}, waiting for the first run",
                    start.to_rfc3339()
                );
            }
            (Some(at), _) => {
                let due = due.map(|d| d.to_rfc3339()).unwrap_or_default();
                report.reason = format!(
                    "last run log at {} predates the firing due at {}",
                    at.to_rfc3339(),
                    due
                );
            }
            (None, _) => {
                report.reason = format!("no run log for job '{}'", job_name);
            }
        }

        Ok(report)
    }
}

/// Find the newest run log of `job` in `log_dir` and check the output
/// directory.
fn scan(log_dir: &Path, job: &str, output_dir: Option<&Path>) -> Result<Evidence, ProbeError> {
    let io_error = |path: &Path, source| ProbeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut newest_log: Option<(PathBuf, DateTime<Utc>)> = None;
    match fs::read_dir(log_dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry.map_err(|e| io_error(log_dir, e))?;
                let name = entry.file_name();
                if !is_run_log_of(&name.to_string_lossy(), job) {
                    continue;
                }
                let path = entry.path();
                let Ok(meta) = entry.metadata() else {
                    // deleted by a sweep since read_dir
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                let mtime: DateTime<Utc> = meta.modified().map_err(|e| io_error(&path, e))?.into();
                if newest_log.as_ref().is_none_or(|(_, at)| mtime > *at) {
                    newest_log = Some((path, mtime));
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error(log_dir, e)),
    }

    let output = match output_dir {
        None => OutputState::NotConfigured,
        Some(dir) if !dir.is_dir() => OutputState::Missing,
        Some(dir) => {
            let has_file = WalkDir::new(dir)
                .min_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .any(|e| e.file_type().is_file());
            if has_file {
                OutputState::Present
            } else {
                OutputState::Empty
            }
        }
    };

    Ok(Evidence { newest_log, output })
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
