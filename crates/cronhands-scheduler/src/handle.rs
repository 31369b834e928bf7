//! Control handle for a running scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cronhands_core::{JobAction, RunRecord, RunStatus, ScheduledJob};
use cronhands_runner::RunningJobs;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::SchedulerError;
use crate::history::RunHistory;
use crate::table::ScheduleTable;

/// Per-job counters.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JobStats {
    pub runs: u64,
    pub failures: u64,
    pub skipped: u64,
}

/// Command sent to the scheduler loop.
pub(crate) enum SchedulerCommand {
    Trigger {
        job: String,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Reload {
        jobs: Vec<ScheduledJob>,
        response: oneshot::Sender<Result<usize, SchedulerError>>,
    },
}

/// State shared between the scheduler loop and its handles.
pub(crate) struct SharedState {
    pub table: Arc<ScheduleTable>,
    pub running: RunningJobs,
    pub history: RunHistory,
    pub next_runs: RwLock<HashMap<String, DateTime<Utc>>>,
    pub stats: RwLock<HashMap<String, JobStats>>,
}

impl SharedState {
    pub fn update_stats(&self, job: &str, f: impl FnOnce(&mut JobStats)) {
        f(self.stats.write().entry(job.to_string()).or_default());
    }
}

/// Snapshot of one installed job.
#[derive(Debug, Clone, Serialize)]
pub struct JobState {
    pub name: String,
    pub schedule: String,
    /// `command` or `sweep`.
    pub kind: String,
    pub next_run: Option<DateTime<Utc>>,
    pub running: bool,
    pub runs: u64,
    pub failures: u64,
    /// Firings dropped because a run of the job was still in progress.
    pub skipped: u64,
    pub last_status: Option<RunStatus>,
    pub last_started: Option<DateTime<Utc>>,
}

/// Cloneable handle to a [`Scheduler`](crate::Scheduler).
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared: Arc<SharedState>,
}

impl SchedulerHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<SchedulerCommand>, shared: Arc<SharedState>) -> Self {
        Self { command_tx, shared }
    }

    /// Run a job now. Rejected with `AlreadyRunning` while a run of the same
    /// job is in progress.
    pub async fn trigger(&self, job: &str) -> Result<(), SchedulerError> {
        let (response, rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::Trigger {
                job: job.to_string(),
                response,
            })
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        rx.await.map_err(|_| SchedulerError::Stopped)?
    }

    /// Replace the installed jobs. On error the previous table stays active.
    pub async fn reload(&self, jobs: Vec<ScheduledJob>) -> Result<usize, SchedulerError> {
        let (response, rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::Reload { jobs, response })
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        rx.await.map_err(|_| SchedulerError::Stopped)?
    }

    /// State of every installed job, sorted by name.
    pub fn list(&self) -> Vec<JobState> {
        let next_runs = self.shared.next_runs.read();
        let stats = self.shared.stats.read();

        let mut jobs: Vec<JobState> = self
            .shared
            .table
            .snapshot()
            .iter()
            .map(|installed| {
                let job = &installed.job;
                let counters = stats.get(&job.name).copied().unwrap_or_default();
                let last = self.shared.history.last(&job.name);
                JobState {
                    name: job.name.clone(),
                    schedule: job.schedule.clone(),
                    kind: match job.action {
                        JobAction::Command { .. } => "command",
                        JobAction::Sweep { .. } => "sweep",
                    }
                    .to_string(),
                    next_run: next_runs.get(&job.name).copied(),
                    running: self.shared.running.is_running(&job.name),
                    runs: counters.runs,
                    failures: counters.failures,
                    skipped: counters.skipped,
                    last_status: last.as_ref().map(|r| r.status),
                    last_started: last.as_ref().map(|r| r.started_at),
                }
            })
            .collect();

        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    pub fn get(&self, job: &str) -> Option<JobState> {
        self.list().into_iter().find(|s| s.name == job)
    }

    /// Most recent finished runs of `job`, newest first.
    pub fn history(&self, job: &str, limit: usize) -> Vec<RunRecord> {
        self.shared.history.recent(job, limit)
    }

    /// Names of jobs with a run in progress.
    pub fn running(&self) -> Vec<String> {
        self.shared.running.names()
    }
}
