//! Scheduler driving the real runner and sweeper.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cronhands_core::{RetentionPolicy, RunStatus, ScheduledJob, SystemClock};
use cronhands_runner::TaskRunner;
use cronhands_scheduler::{
    ActionExecutor, FileScheduleStore, ScheduleStore, ScheduleTable, Scheduler, SchedulerConfig,
    SchedulerHandle,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn wait_for_run(handle: &SchedulerHandle, job: &str) -> cronhands_core::RunRecord {
    for _ in 0..100 {
        if let Some(run) = handle.history(job, 1).into_iter().next() {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("job {} never finished", job);
}

#[tokio::test]
async fn failing_run_leaves_schedule_intact() {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("logs");
    let store = Arc::new(FileScheduleStore::new(dir.path().join("state/schedule.json")));
    let table = Arc::new(ScheduleTable::new(store.clone()));
    let runner = Arc::new(TaskRunner::new(&log_dir).without_relay());

    let scheduler = Scheduler::new(
        table,
        Arc::new(ActionExecutor::new(runner)),
        Arc::new(SystemClock),
        SchedulerConfig::default(),
    );
    let job = ScheduledJob::command("scraper", "0 8 * * *", "echo trying; exit 1", dir.path());
    scheduler.install(vec![job]).await.unwrap();

    let handle = scheduler.handle();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(shutdown.clone()));

    let next_before = handle.get("scraper").unwrap().next_run.unwrap();
    handle.trigger("scraper").await.unwrap();
    let run = wait_for_run(&handle, "scraper").await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_code, Some(1));
    let state = handle.get("scraper").unwrap();
    assert_eq!(state.next_run, Some(next_before));
    assert!(state.next_run.unwrap() > Utc::now());

    let stored = store.load().await.unwrap().unwrap();
    assert_eq!(stored.jobs.len(), 1);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn sweep_job_spares_the_log_of_a_running_job() {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("logs");
    let runner = Arc::new(TaskRunner::new(&log_dir).without_relay());

    let scraper = ScheduledJob::command("scraper", "0 8 * * *", "sleep 2", dir.path());
    // zero max age: everything that is not in use is expired
    let policy = RetentionPolicy::for_job_logs(&log_dir, ["scraper"], Duration::ZERO);
    let cleanup = ScheduledJob::sweep("cleanup", "0 3 * * *", policy);

    let scheduler = Scheduler::new(
        Arc::new(ScheduleTable::in_memory()),
        Arc::new(ActionExecutor::new(runner)),
        Arc::new(SystemClock),
        SchedulerConfig::default(),
    );
    scheduler.install(vec![scraper, cleanup]).await.unwrap();
    let handle = scheduler.handle();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(shutdown.clone()));

    handle.trigger("scraper").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    handle.trigger("cleanup").await.unwrap();

    let sweep = wait_for_run(&handle, "cleanup").await;
    assert_eq!(sweep.status, RunStatus::Succeeded);
    let run = wait_for_run(&handle, "scraper").await;
    assert!(run.log_path.as_ref().unwrap().exists());

    shutdown.cancel();
    task.await.unwrap();
}
