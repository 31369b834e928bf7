//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use cronhands_core::{RetentionPolicy, ScheduledJob};
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl Config {
    /// Build the schedule table from the `[[jobs]]` entries.
    ///
    /// Sweep jobs without explicit patterns match the log files of every
    /// command job.
    pub fn scheduled_jobs(&self) -> Vec<ScheduledJob> {
        let command_jobs: Vec<&str> = self
            .jobs
            .iter()
            .filter(|j| j.command.is_some())
            .map(|j| j.name.as_str())
            .collect();

        self.jobs
            .iter()
            .map(|job| job.to_scheduled(&self.paths, &command_jobs))
            .collect()
    }

    /// Name of the job whose evidence the liveness probe checks.
    pub fn health_job(&self) -> Option<&str> {
        self.health.job.as_deref().or_else(|| {
            self.jobs
                .iter()
                .find(|j| j.command.is_some())
                .map(|j| j.name.as_str())
        })
    }

    /// Location of the daemon PID file.
    pub fn pid_file(&self) -> PathBuf {
        self.paths.state_dir.join("cronhands.pid")
    }

    /// Location of the persisted schedule table.
    pub fn schedule_file(&self) -> PathBuf {
        self.paths.state_dir.join("schedule.json")
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where run logs (and the daemon's own log) are written.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Schedule store and PID file.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/app/logs")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/app/state")
}

/// Daemon timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// How long to wait for in-flight runs on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Delay between SIGTERM and SIGKILL when terminating a run.
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,

    /// Upper bound on a single scheduler sleep.
    #[serde(default = "default_max_sleep")]
    pub max_sleep_secs: u64,

    /// Write a PID file in `state_dir`.
    #[serde(default = "default_true")]
    pub pid_file: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout(),
            kill_grace_secs: default_kill_grace(),
            max_sleep_secs: default_max_sleep(),
            pid_file: true,
        }
    }
}

impl DaemonConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn max_sleep(&self) -> Duration {
        Duration::from_secs(self.max_sleep_secs)
    }
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_kill_grace() -> u64 {
    10
}

fn default_max_sleep() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// Liveness probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Job whose logs count as evidence. Defaults to the first command job.
    #[serde(default)]
    pub job: Option<String>,

    /// How long after a due firing its run log may still be missing.
    #[serde(default = "default_grace")]
    pub grace_secs: u64,

    /// Directory that must exist and be non-empty once the job has run.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            job: None,
            grace_secs: default_grace(),
            output_dir: None,
        }
    }
}

impl HealthConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

fn default_grace() -> u64 {
    300
}

/// Daemon logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Also write a daily rolling log to `log_dir`.
    #[serde(default = "default_true")]
    pub file: bool,

    /// Copy run output to the daemon's stdout.
    #[serde(default = "default_true")]
    pub relay: bool,

    /// Emit JSON instead of human-readable lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: true,
            relay: true,
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// One `[[jobs]]` entry. Exactly one of `command` and `sweep` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,

    /// Five-field cron expression, UTC.
    pub schedule: String,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub sweep: Option<SweepConfig>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub on_success: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl JobConfig {
    fn to_scheduled(&self, paths: &PathsConfig, command_jobs: &[&str]) -> ScheduledJob {
        let mut job = match (&self.command, &self.sweep) {
            (Some(command), _) => ScheduledJob::command(
                &self.name,
                &self.schedule,
                command,
                self.working_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            ),
            (None, Some(sweep)) => {
                ScheduledJob::sweep(&self.name, &self.schedule, sweep.policy(paths, command_jobs))
            }
            // rejected by the validator; an empty command fails at spawn time
            (None, None) => ScheduledJob::command(&self.name, &self.schedule, "", "."),
        };

        job.env = self.env.clone();
        job.timeout_secs = self.timeout_secs;
        job.on_success = self.on_success.clone();
        job
    }
}

/// `[jobs.sweep]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,

    /// Directory to sweep. Defaults to `paths.log_dir`.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub include_dirs: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            directory: None,
            patterns: Vec::new(),
            include_dirs: false,
        }
    }
}

impl SweepConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_days * 24 * 60 * 60)
    }

    fn policy(&self, paths: &PathsConfig, command_jobs: &[&str]) -> RetentionPolicy {
        let directory = self
            .directory
            .clone()
            .unwrap_or_else(|| paths.log_dir.clone());

        let policy = if self.patterns.is_empty() {
            RetentionPolicy::for_job_logs(directory, command_jobs.iter().copied(), self.max_age())
        } else {
            self.patterns
                .iter()
                .fold(RetentionPolicy::new(directory, self.max_age()), |p, pat| {
                    p.with_pattern(pat)
                })
        };
        policy.with_include_dirs(self.include_dirs)
    }
}

fn default_max_age_days() -> u64 {
    30
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
