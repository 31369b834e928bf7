//! What the scheduler calls when a job fires.

use std::sync::Arc;

use async_trait::async_trait;
use cronhands_core::{Clock, JobAction, RunRecord, RunStatus, ScheduledJob, SystemClock, Trigger};
use cronhands_retention::RetentionSweeper;
use cronhands_runner::{TaskError, TaskRunner};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Executes one firing of a job.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(
        &self,
        job: &ScheduledJob,
        trigger: Trigger,
        cancel: CancellationToken,
    ) -> Result<RunRecord, TaskError>;
}

/// Runs command jobs through a [`TaskRunner`] and sweep jobs through a
/// [`RetentionSweeper`].
pub struct ActionExecutor {
    runner: Arc<TaskRunner>,
    sweeper: RetentionSweeper,
    clock: Arc<dyn Clock>,
}

impl ActionExecutor {
    /// The sweeper shares the runner's active-log registry.
    pub fn new(runner: Arc<TaskRunner>) -> Self {
        let sweeper = RetentionSweeper::new(runner.active_logs().clone());
        Self {
            runner,
            sweeper,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.runner
    }

    async fn sweep(&self, job: &ScheduledJob, trigger: Trigger) -> Result<RunRecord, TaskError> {
        let JobAction::Sweep { policy } = &job.action else {
            return Err(TaskError::NotACommand(job.name.clone()));
        };

        let started = self.clock.now();
        let mut record = RunRecord::start(&job.name, trigger, started);

        let sweeper = self.sweeper.clone();
        let policy = policy.clone();
        let report = tokio::task::spawn_blocking(move || sweeper.sweep(&policy, started))
            .await
            .map_err(|e| TaskError::Io(std::io::Error::other(e.to_string())))?;

        for error in &report.errors {
            warn!(job = %job.name, run_id = %record.run_id, "Sweep error: {}", error);
        }
        info!(job = %job.name, run_id = %record.run_id, "Sweep finished: {}", report);

        let status = if report.is_clean() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        let exit_code = if report.is_clean() { 0 } else { 1 };
        // a fresh record cannot already be finalized
        let _ = record.finish(status, Some(exit_code), false, self.clock.now());
        Ok(record.with_message(report.to_string()))
    }
}

#[async_trait]
impl JobExecutor for ActionExecutor {
    async fn execute(
        &self,
        job: &ScheduledJob,
        trigger: Trigger,
        cancel: CancellationToken,
    ) -> Result<RunRecord, TaskError> {
        match &job.action {
            JobAction::Command { .. } => self.runner.run(job, trigger, cancel).await,
            JobAction::Sweep { .. } => self.sweep(job, trigger).await,
        }
    }
}
