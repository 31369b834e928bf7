use super::*;
use async_trait::async_trait;
use chrono::TimeZone;
use cronhands_core::RunStatus;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wall clock that follows tokio's (pausable) time, with manual jumps.
struct TestClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
    jumped: Mutex<chrono::Duration>,
}

impl TestClock {
    fn at(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            origin: tokio::time::Instant::now(),
            jumped: Mutex::new(chrono::Duration::zero()),
        })
    }

    fn jump(&self, by: chrono::Duration) {
        *self.jumped.lock() += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap();
        self.base + elapsed + *self.jumped.lock()
    }
}

#[derive(Debug, Clone)]
struct Fired {
    job: String,
    trigger: Trigger,
    at: DateTime<Utc>,
}

/// Executor that sleeps for a fixed time and succeeds unless the job name
/// starts with `fail`. Jobs named `panic*` panic instead of finishing.
struct FakeExecutor {
    clock: Arc<TestClock>,
    duration: Duration,
    fired: Mutex<Vec<Fired>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    cancelled: AtomicUsize,
}

impl FakeExecutor {
    fn new(clock: Arc<TestClock>, duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            clock,
            duration,
            fired: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        })
    }

    fn fired(&self) -> Vec<Fired> {
        self.fired.lock().clone()
    }

    fn fired_for(&self, job: &str) -> Vec<Fired> {
        self.fired().into_iter().filter(|f| f.job == job).collect()
    }
}

#[async_trait]
impl JobExecutor for FakeExecutor {
    async fn execute(
        &self,
        job: &ScheduledJob,
        trigger: Trigger,
        cancel: CancellationToken,
    ) -> Result<RunRecord, TaskError> {
        let started = self.clock.now();
        self.fired.lock().push(Fired {
            job: job.name.clone(),
            trigger: trigger.clone(),
            at: started,
        });
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let mut record = RunRecord::start(&job.name, trigger, started);
        let status = tokio::select! {
            _ = tokio::time::sleep(self.duration) => {
                if job.name.starts_with("panic") {
                    panic!("executor blew up");
                }
                if job.name.starts_with("fail") {
                    RunStatus::Failed
                } else {
                    RunStatus::Succeeded
                }
            }
            _ = cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                RunStatus::Crashed
            }
        };
        self.active.fetch_sub(1, Ordering::SeqCst);

        let code = if status.is_success() { 0 } else { 1 };
        record
            .finish(status, Some(code), false, self.clock.now())
            .unwrap();
        Ok(record)
    }
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap()
}

fn job(name: &str, schedule: &str) -> ScheduledJob {
    ScheduledJob::command(name, schedule, "true", "/app")
}

struct Harness {
    clock: Arc<TestClock>,
    executor: Arc<FakeExecutor>,
    handle: SchedulerHandle,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

async fn start(start_at: DateTime<Utc>, run_for: Duration, jobs: Vec<ScheduledJob>) -> Harness {
    let clock = TestClock::at(start_at);
    let executor = FakeExecutor::new(clock.clone(), run_for);
    let scheduler = Scheduler::new(
        Arc::new(ScheduleTable::in_memory()),
        executor.clone(),
        clock.clone(),
        SchedulerConfig {
            max_sleep: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(5),
            history_capacity: 20,
        },
    );
    scheduler.install(jobs).await.unwrap();

    let handle = scheduler.handle();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(shutdown.clone()));
    Harness {
        clock,
        executor,
        handle,
        shutdown,
        task,
    }
}

impl Harness {
    async fn stop(self) -> Arc<FakeExecutor> {
        self.shutdown.cancel();
        self.task.await.unwrap();
        self.executor
    }
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn test_fires_at_cron_time() {
    let h = start(at(7, 59, 0), Duration::from_secs(2), vec![job("scraper", "0 8 * * *")]).await;

    advance(59).await;
    assert!(h.executor.fired().is_empty());

    advance(5).await;
    let fired = h.executor.fired();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].trigger, Trigger::Schedule);
    assert_eq!(fired[0].at, at(8, 0, 0));

    let state = h.handle.get("scraper").unwrap();
    assert_eq!(state.runs, 1);
    assert_eq!(state.last_status, Some(RunStatus::Succeeded));
    assert_eq!(
        state.next_run,
        Some(Utc.with_ymd_and_hms(2024, 1, 16, 8, 0, 0).unwrap())
    );

    let history = h.handle.history("scraper", 5);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].exit_code, Some(0));
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_firing_is_skipped() {
    // every minute, each run takes two and a half
    let h = start(
        at(7, 59, 30),
        Duration::from_secs(150),
        vec![job("scraper", "* * * * *")],
    )
    .await;

    advance(220).await;

    let fired = h.executor.fired_for("scraper");
    let times: Vec<_> = fired.iter().map(|f| f.at).collect();
    assert_eq!(times, vec![at(8, 0, 0), at(8, 3, 0)]);
    assert_eq!(h.executor.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(h.handle.get("scraper").unwrap().skipped, 2);

    let executor = h.stop().await;
    assert_eq!(executor.cancelled.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_different_jobs_overlap_freely() {
    let h = start(
        at(7, 59, 30),
        Duration::from_secs(120),
        vec![job("scraper", "0 8 * * *"), job("mirror", "0 8 * * *")],
    )
    .await;

    advance(60).await;
    assert_eq!(h.executor.fired().len(), 2);
    assert_eq!(h.executor.max_active.load(Ordering::SeqCst), 2);
    assert_eq!(h.handle.running(), vec!["mirror".to_string(), "scraper".to_string()]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_missed_firings_are_coalesced() {
    let h = start(at(7, 59, 0), Duration::from_secs(1), vec![job("hourly", "0 * * * *")]).await;

    advance(61).await;
    assert_eq!(h.executor.fired().len(), 1);

    // host suspended for five hours
    h.clock.jump(chrono::Duration::hours(5));
    advance(70).await;

    let fired = h.executor.fired();
    assert_eq!(fired.len(), 2);
    assert_eq!(fired[1].trigger, Trigger::Schedule);
    assert_eq!(
        h.handle.get("hourly").unwrap().next_run,
        Some(at(14, 0, 0))
    );
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_not_retried() {
    let h = start(at(7, 59, 0), Duration::from_secs(1), vec![job("failing", "0 8 * * *")]).await;

    advance(600).await;

    assert_eq!(h.executor.fired().len(), 1);
    let state = h.handle.get("failing").unwrap();
    assert_eq!(state.failures, 1);
    assert_eq!(state.last_status, Some(RunStatus::Failed));
    assert_eq!(
        state.next_run,
        Some(Utc.with_ymd_and_hms(2024, 1, 16, 8, 0, 0).unwrap())
    );
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicked_run_is_recorded_as_crashed() {
    let h = start(
        at(7, 59, 0),
        Duration::from_secs(1),
        vec![
            job("panicky", "0 8 * * *").with_on_success("processor"),
            job("processor", "0 12 * * *"),
        ],
    )
    .await;

    advance(70).await;

    let state = h.handle.get("panicky").unwrap();
    assert_eq!(state.runs, 1);
    assert_eq!(state.failures, 1);
    assert_eq!(state.last_status, Some(RunStatus::Crashed));
    assert!(h.handle.running().is_empty());

    let history = h.handle.history("panicky", 5);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].trigger, Trigger::Schedule);
    assert_eq!(history[0].started_at, at(8, 0, 0));
    assert!(history[0].is_finalized());
    assert_eq!(history[0].message.as_deref(), Some("run task panicked"));
    assert!(h.executor.fired_for("processor").is_empty());
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_success_chains_into_next_job() {
    let h = start(
        at(7, 59, 0),
        Duration::from_secs(5),
        vec![
            job("scraper", "0 8 * * *").with_on_success("processor"),
            job("processor", "0 12 * * *"),
        ],
    )
    .await;

    advance(70).await;

    let processor = h.executor.fired_for("processor");
    assert_eq!(processor.len(), 1);
    assert_eq!(processor[0].trigger, Trigger::Chained("scraper".to_string()));
    assert_eq!(processor[0].at, at(8, 0, 5));
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_chain() {
    let h = start(
        at(7, 59, 0),
        Duration::from_secs(5),
        vec![
            job("failing", "0 8 * * *").with_on_success("processor"),
            job("processor", "0 12 * * *"),
        ],
    )
    .await;

    advance(70).await;
    assert!(h.executor.fired_for("processor").is_empty());
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_trigger() {
    let h = start(at(7, 0, 0), Duration::from_secs(30), vec![job("scraper", "0 8 * * *")]).await;

    h.handle.trigger("scraper").await.unwrap();
    let err = h.handle.trigger("scraper").await.unwrap_err();
    assert!(matches!(err, SchedulerError::AlreadyRunning(_)));

    let err = h.handle.trigger("missing").await.unwrap_err();
    assert!(matches!(err, SchedulerError::UnknownJob(_)));

    advance(31).await;
    let fired = h.executor.fired();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].trigger, Trigger::Manual);
    assert!(h.handle.running().is_empty());
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reload_swaps_table() {
    let h = start(at(7, 0, 0), Duration::from_secs(1), vec![job("scraper", "0 8 * * *")]).await;

    let count = h
        .handle
        .reload(vec![job("scraper", "0 9 * * *"), job("cleanup", "30 7 * * *")])
        .await
        .unwrap();
    assert_eq!(count, 2);

    let names: Vec<_> = h.handle.list().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["cleanup".to_string(), "scraper".to_string()]);
    assert_eq!(h.handle.get("scraper").unwrap().next_run, Some(at(9, 0, 0)));

    let err = h
        .handle
        .reload(vec![job("scraper", "not a cron")])
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Install(_)));
    assert_eq!(h.handle.list().len(), 2);

    advance(31 * 60).await;
    assert_eq!(h.executor.fired_for("cleanup").len(), 1);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reload_keeps_pending_firing_of_unchanged_job() {
    let h = start(at(7, 0, 0), Duration::from_secs(1), vec![job("scraper", "0 8 * * *")]).await;

    advance(30 * 60).await;
    h.handle
        .reload(vec![job("scraper", "0 8 * * *"), job("other", "0 9 * * *")])
        .await
        .unwrap();

    assert_eq!(h.handle.get("scraper").unwrap().next_run, Some(at(8, 0, 0)));
    advance(31 * 60).await;
    assert_eq!(h.executor.fired_for("scraper").len(), 1);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_in_flight_runs() {
    let h = start(at(7, 59, 0), Duration::from_secs(3600), vec![job("scraper", "0 8 * * *")]).await;

    advance(61).await;
    assert_eq!(h.handle.running(), vec!["scraper".to_string()]);

    let handle = h.handle.clone();
    let executor = h.stop().await;
    assert_eq!(executor.cancelled.load(Ordering::SeqCst), 1);

    let history = handle.history("scraper", 1);
    assert_eq!(history[0].status, RunStatus::Crashed);
    assert!(matches!(
        handle.trigger("scraper").await,
        Err(SchedulerError::Stopped)
    ));
}
