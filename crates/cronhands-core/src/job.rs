//! Job definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Name reserved for the daemon's own log files.
pub const RESERVED_JOB_NAME: &str = "cronhands";

/// Check that a job name can be embedded in log file names and glob patterns.
pub fn validate_job_name(name: &str) -> Result<(), CoreError> {
    let invalid = |reason: &str| CoreError::InvalidJobName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.len() > 64 {
        return Err(invalid("name is longer than 64 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid("only ASCII letters, digits, '-' and '_' are allowed"));
    }
    if name == RESERVED_JOB_NAME {
        return Err(invalid("name is reserved for the daemon log"));
    }
    Ok(())
}

/// Which files a sweep deletes and how old they must be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Directory scanned by the sweep (not recursive).
    pub directory: PathBuf,
    /// Glob patterns relative to `directory`, e.g. `scraper_*.log`.
    pub patterns: Vec<String>,
    /// Entries strictly older than this are deleted.
    pub max_age_secs: u64,
    /// Whether matching directories (scrape artifacts) may be removed too.
    #[serde(default)]
    pub include_dirs: bool,
}

impl RetentionPolicy {
    pub fn new(directory: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            directory: directory.into(),
            patterns: Vec::new(),
            max_age_secs: max_age.as_secs(),
            include_dirs: false,
        }
    }

    /// Policy matching the log files of the given jobs (`<job>_*.log`).
    pub fn for_job_logs<'a>(
        directory: impl Into<PathBuf>,
        jobs: impl IntoIterator<Item = &'a str>,
        max_age: Duration,
    ) -> Self {
        let mut policy = Self::new(directory, max_age);
        policy.patterns = jobs
            .into_iter()
            .map(|job| format!("{}_*.log", job))
            .collect();
        policy
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn with_include_dirs(mut self, include_dirs: bool) -> Self {
        self.include_dirs = include_dirs;
        self
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// What a job does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobAction {
    /// Run a shell command (`sh -c`) as a child process.
    Command { command: String },
    /// Run a retention sweep.
    Sweep { policy: RetentionPolicy },
}

/// A named recurring unit of work.
///
/// Immutable once installed; a reload replaces the whole table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Unique name within a schedule table.
    pub name: String,
    /// Five-field cron expression (`minute hour day month weekday`).
    pub schedule: String,
    pub action: JobAction,
    /// Working directory of the child process.
    pub working_dir: PathBuf,
    /// Extra environment for the child process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Optional wall-clock limit for a run.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Job triggered after a successful run of this one.
    #[serde(default)]
    pub on_success: Option<String>,
}

impl ScheduledJob {
    /// Create a command job.
    pub fn command(
        name: impl Into<String>,
        schedule: impl Into<String>,
        command: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            action: JobAction::Command {
                command: command.into(),
            },
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            timeout_secs: None,
            on_success: None,
        }
    }

    /// Create a sweep job. The working directory is the swept directory.
    pub fn sweep(
        name: impl Into<String>,
        schedule: impl Into<String>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            working_dir: policy.directory.clone(),
            action: JobAction::Sweep { policy },
            env: BTreeMap::new(),
            timeout_secs: None,
            on_success: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn with_on_success(mut self, job: impl Into<String>) -> Self {
        self.on_success = Some(job.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn is_command(&self) -> bool {
        matches!(self.action, JobAction::Command { .. })
    }

    /// The shell command, for command jobs.
    pub fn command_line(&self) -> Option<&str> {
        match &self.action {
            JobAction::Command { command } => Some(command),
            JobAction::Sweep { .. } => None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
