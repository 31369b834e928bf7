//! The firing loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cronhands_core::{Clock, RunRecord, RunStatus, ScheduledJob, Trigger};
use cronhands_runner::{RunningJobs, TaskError};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ScheduleInstallError, SchedulerError};
use crate::executor::JobExecutor;
use crate::handle::{SchedulerCommand, SchedulerHandle, SharedState};
use crate::history::RunHistory;
use crate::table::{InstalledJob, ScheduleTable};

type RunResult = (String, Result<RunRecord, TaskError>);

/// Run tasks in flight, each with the record opened when it fired so a
/// task that dies without reporting still ends up in the history.
struct InFlight {
    tasks: JoinSet<RunResult>,
    opened: HashMap<Id, RunRecord>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            opened: HashMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn spawn<F>(&mut self, opened: RunRecord, run: F)
    where
        F: std::future::Future<Output = RunResult> + Send + 'static,
    {
        let handle = self.tasks.spawn(run);
        self.opened.insert(handle.id(), opened);
    }

    /// Next finished run. A panicked task comes back as a crashed run.
    async fn join_next(&mut self, clock: &dyn Clock) -> Option<RunResult> {
        loop {
            match self.tasks.join_next_with_id().await? {
                Ok((id, output)) => {
                    self.opened.remove(&id);
                    return Some(output);
                }
                Err(e) => {
                    let Some(mut record) = self.opened.remove(&e.id()) else {
                        error!("Job run task failed: {}", e);
                        continue;
                    };
                    error!(
                        job = %record.job,
                        run_id = %record.run_id,
                        "Job run task failed: {}",
                        e
                    );
                    let reason = if e.is_panic() { "panicked" } else { "was cancelled" };
                    // freshly opened, never finalized
                    let _ = record.finish(RunStatus::Crashed, None, false, clock.now());
                    let record = record.with_message(format!("run task {}", reason));
                    return Some((record.job.clone(), Ok(record)));
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        self.tasks.shutdown().await;
        self.opened.clear();
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Longest the loop sleeps before re-reading the clock. Bounds how late
    /// a firing can be noticed after a clock jump or host suspend.
    pub max_sleep: Duration,
    /// How long shutdown waits for in-flight runs before aborting them.
    pub shutdown_timeout: Duration,
    /// Finished runs kept per job.
    pub history_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_sleep: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            history_capacity: 50,
        }
    }
}

/// Fires installed jobs at their cron times.
///
/// At most one run per job is in flight. A firing that finds the previous run
/// still going is skipped, and firings missed while the process was not
/// looking are coalesced into one.
pub struct Scheduler {
    shared: Arc<SharedState>,
    executor: Arc<dyn JobExecutor>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    pub fn new(
        table: Arc<ScheduleTable>,
        executor: Arc<dyn JobExecutor>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        let shared = Arc::new(SharedState {
            table,
            running: RunningJobs::new(),
            history: RunHistory::new(config.history_capacity),
            next_runs: RwLock::new(HashMap::new()),
            stats: RwLock::new(HashMap::new()),
        });
        let scheduler = Self {
            shared,
            executor,
            clock,
            config,
            command_tx,
            command_rx,
        };
        scheduler.refresh_next_runs(&[], &scheduler.shared.table.snapshot());
        scheduler
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.command_tx.clone(), self.shared.clone())
    }

    pub fn table(&self) -> &Arc<ScheduleTable> {
        &self.shared.table
    }

    /// Install a new job table. Returns the number of installed jobs.
    ///
    /// Runs already in flight are not affected.
    pub async fn install(&self, jobs: Vec<ScheduledJob>) -> Result<usize, ScheduleInstallError> {
        let previous = self.shared.table.snapshot();
        let installed = self.shared.table.install(jobs, self.clock.now()).await?;
        self.refresh_next_runs(&previous, &installed);
        Ok(installed.len())
    }

    /// Recompute next firings after an install. A job whose name and
    /// expression are unchanged keeps its pending firing.
    fn refresh_next_runs(&self, previous: &[InstalledJob], installed: &[InstalledJob]) {
        let now = self.clock.now();
        let mut next_runs = self.shared.next_runs.write();
        let mut refreshed = HashMap::with_capacity(installed.len());

        for entry in installed {
            let unchanged = previous
                .iter()
                .any(|p| p.name() == entry.name() && p.spec.expr() == entry.spec.expr());
            let next = match next_runs.get(entry.name()) {
                Some(next) if unchanged => Some(*next),
                _ => entry.next_after(now),
            };
            if let Some(next) = next {
                refreshed.insert(entry.job.name.clone(), next);
            }
        }

        *next_runs = refreshed;
    }

    /// Drive the loop until `shutdown` is cancelled, then cancel in-flight
    /// runs and wait for them up to the shutdown timeout.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Scheduler started with {} jobs",
            self.shared.table.snapshot().len()
        );

        let runs_cancel = CancellationToken::new();
        let clock = self.clock.clone();
        let mut tasks = InFlight::new();

        loop {
            let now = self.clock.now();
            self.fire_due(now, &mut tasks, &runs_cancel);

            let sleep = self.time_until_next(now);
            debug!("Scheduler sleeping for {:?}", sleep);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(sleep) => {}
                Some(cmd) = self.command_rx.recv() => {
                    self.handle_command(cmd, &mut tasks, &runs_cancel).await;
                }
                Some(result) = tasks.join_next(clock.as_ref()), if !tasks.is_empty() => {
                    if let Some((source, target)) = self.complete(result) {
                        self.chain(&source, &target, &mut tasks, &runs_cancel);
                    }
                }
            }
        }

        self.shutdown(tasks, runs_cancel).await;
    }

    async fn handle_command(
        &mut self,
        cmd: SchedulerCommand,
        tasks: &mut InFlight,
        runs_cancel: &CancellationToken,
    ) {
        match cmd {
            SchedulerCommand::Trigger { job, response } => {
                let result = match self.shared.table.get(&job) {
                    Some(installed) => {
                        self.spawn_run(&installed.job, Trigger::Manual, tasks, runs_cancel)
                    }
                    None => Err(SchedulerError::UnknownJob(job)),
                };
                let _ = response.send(result);
            }
            SchedulerCommand::Reload { jobs, response } => {
                let result = self.install(jobs).await.map_err(SchedulerError::from);
                match &result {
                    Ok(count) => info!("Schedule reloaded with {} jobs", count),
                    Err(e) => error!("Schedule reload failed, keeping previous table: {}", e),
                }
                let _ = response.send(result);
            }
        }
    }

    /// Fire every job whose next firing is at or before `now`.
    fn fire_due(
        &self,
        now: DateTime<Utc>,
        tasks: &mut InFlight,
        runs_cancel: &CancellationToken,
    ) {
        let table = self.shared.table.snapshot();
        let mut due = Vec::new();

        {
            let mut next_runs = self.shared.next_runs.write();
            for entry in table.iter() {
                let Some(scheduled) = next_runs.get(entry.name()).copied() else {
                    continue;
                };
                if scheduled > now {
                    continue;
                }

                if entry.next_after(scheduled).is_some_and(|n| n <= now) {
                    info!(
                        job = %entry.name(),
                        "Coalescing missed firings since {} into one",
                        scheduled
                    );
                }

                match entry.next_after(now) {
                    Some(next) => {
                        next_runs.insert(entry.job.name.clone(), next);
                    }
                    None => {
                        warn!(job = %entry.name(), "Job has no further firings");
                        next_runs.remove(entry.name());
                    }
                }
                due.push(entry.job.clone());
            }
        }

        for job in due {
            if let Err(SchedulerError::AlreadyRunning(name)) =
                self.spawn_run(&job, Trigger::Schedule, tasks, runs_cancel)
            {
                warn!(job = %name, "Previous run still in progress, skipping firing");
                self.shared.update_stats(&name, |s| s.skipped += 1);
            }
        }
    }

    fn time_until_next(&self, now: DateTime<Utc>) -> Duration {
        self.shared
            .next_runs
            .read()
            .values()
            .min()
            .map(|next| (*next - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(self.config.max_sleep)
            .min(self.config.max_sleep)
    }

    fn spawn_run(
        &self,
        job: &ScheduledJob,
        trigger: Trigger,
        tasks: &mut InFlight,
        runs_cancel: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        let guard = self
            .shared
            .running
            .try_claim(&job.name)
            .ok_or_else(|| SchedulerError::AlreadyRunning(job.name.clone()))?;

        debug!(job = %job.name, trigger = %trigger, "Firing job");

        let opened = RunRecord::start(&job.name, trigger.clone(), self.clock.now());
        let executor = self.executor.clone();
        let job = job.clone();
        let cancel = runs_cancel.child_token();
        tasks.spawn(opened, async move {
            let _guard = guard;
            let result = executor.execute(&job, trigger, cancel).await;
            (job.name, result)
        });
        Ok(())
    }

    /// Record a finished run. Returns the chained job to trigger, if any.
    fn complete(&self, (job, result): RunResult) -> Option<(String, String)> {
        match result {
            Ok(record) => {
                let success = record.status.is_success();
                info!(
                    job = %job,
                    run_id = %record.run_id,
                    status = %record.status,
                    exit_code = ?record.exit_code,
                    "Run finished"
                );
                self.shared.update_stats(&job, |s| {
                    s.runs += 1;
                    if !success {
                        s.failures += 1;
                    }
                });
                self.shared.history.record(record);

                if !success {
                    return None;
                }
                self.shared
                    .table
                    .get(&job)
                    .and_then(|installed| installed.job.on_success)
                    .map(|target| (job, target))
            }
            Err(TaskError::AlreadyRunning { pid, .. }) => {
                warn!(job = %job, "Job is locked by process {}, skipping firing", pid);
                self.shared.update_stats(&job, |s| s.skipped += 1);
                None
            }
            Err(e) => {
                error!(job = %job, "Run could not start: {}", e);
                self.shared.update_stats(&job, |s| s.failures += 1);
                None
            }
        }
    }

    fn chain(
        &self,
        source: &str,
        target: &str,
        tasks: &mut InFlight,
        runs_cancel: &CancellationToken,
    ) {
        let Some(installed) = self.shared.table.get(target) else {
            warn!(job = %source, "Chained job '{}' is no longer installed", target);
            return;
        };

        info!(job = %source, "Triggering chained job '{}'", target);
        let trigger = Trigger::Chained(source.to_string());
        if let Err(e) = self.spawn_run(&installed.job, trigger, tasks, runs_cancel) {
            warn!(job = %target, "Chained run skipped: {}", e);
            self.shared.update_stats(target, |s| s.skipped += 1);
        }
    }

    async fn shutdown(&self, mut tasks: InFlight, runs_cancel: CancellationToken) {
        if tasks.is_empty() {
            info!("Scheduler stopped");
            return;
        }

        info!("Cancelling {} in-flight runs", tasks.len());
        runs_cancel.cancel();

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(result) = tasks.join_next(self.clock.as_ref()).await {
                self.complete(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "In-flight runs did not stop within {:?}, aborting {}",
                self.config.shutdown_timeout,
                tasks.len()
            );
            tasks.shutdown().await;
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
