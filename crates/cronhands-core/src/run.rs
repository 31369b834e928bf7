//! Run records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// What caused a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum Trigger {
    /// The job's cron schedule came due.
    Schedule,
    /// An operator asked for it.
    Manual,
    /// The named job succeeded and chains into this one.
    Chained(String),
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Schedule => write!(f, "schedule"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::Chained(job) => write!(f, "chained:{}", job),
        }
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// Exit code 0.
    Succeeded,
    /// Non-zero exit code, or the run could not be started.
    Failed,
    /// The process was killed or signaled.
    Crashed,
    /// The job's timeout elapsed and the process was terminated.
    TimedOut,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "success",
            RunStatus::Failed => "failed",
            RunStatus::Crashed => "crashed",
            RunStatus::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            "crashed" => Ok(RunStatus::Crashed),
            "timed_out" => Ok(RunStatus::TimedOut),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// One firing of a job.
///
/// Created when the job fires, finalized once by the runner that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub job: String,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    /// Log file of the run. `None` for sweeps and for runs whose log could not be created.
    pub log_path: Option<PathBuf>,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub signaled: bool,
    pub finished_at: Option<DateTime<Utc>>,
    /// Short human-readable detail (spawn error, sweep summary, ...).
    pub message: Option<String>,
}

impl RunRecord {
    /// Open a new run.
    pub fn start(job: impl Into<String>, trigger: Trigger, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job: job.into(),
            trigger,
            started_at,
            log_path: None,
            status: RunStatus::Running,
            exit_code: None,
            signaled: false,
            finished_at: None,
            message: None,
        }
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Finalize the run. A second call is rejected.
    pub fn finish(
        &mut self,
        status: RunStatus,
        exit_code: Option<i32>,
        signaled: bool,
        finished_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if self.is_finalized() {
            return Err(CoreError::AlreadyFinalized {
                run_id: self.run_id,
            });
        }
        self.status = status;
        self.exit_code = exit_code;
        self.signaled = signaled;
        self.finished_at = Some(finished_at);
        Ok(())
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Wall-clock duration, once finalized.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    /// Whether the `[start, end]` intervals of two runs intersect.
    /// An unfinished run extends to infinity.
    pub fn overlaps(&self, other: &RunRecord) -> bool {
        let ends_before = |a: &RunRecord, b: &RunRecord| match a.finished_at {
            Some(end) => end < b.started_at,
            None => false,
        };
        !(ends_before(self, other) || ends_before(other, self))
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
