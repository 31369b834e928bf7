//! Task runner.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use cronhands_core::{Clock, RunRecord, RunStatus, ScheduledJob, SystemClock, Trigger};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::active::ActiveLogs;
use crate::error::TaskError;
use crate::lock::JobLock;
use crate::log_writer::{LogFooter, LogHeader, LogWriter};
use crate::outcome::ProcessOutcome;

/// Parent-visible stream that receives a copy of every run's output.
pub type Relay = Arc<Mutex<Box<dyn Write + Send>>>;

type Sink = Arc<Mutex<LogWriter>>;

const CHUNK_SIZE: usize = 8192;

/// How the wait on the child ended.
enum Ending {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

/// Runs command jobs as child processes and records their outcome.
pub struct TaskRunner {
    log_dir: PathBuf,
    kill_grace: Duration,
    drain_timeout: Duration,
    relay: Option<Relay>,
    active: ActiveLogs,
    clock: Arc<dyn Clock>,
    use_locks: bool,
}

impl TaskRunner {
    /// Create a runner writing logs to `log_dir` and relaying output to stdout.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            kill_grace: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
            relay: Some(Arc::new(Mutex::new(Box::new(std::io::stdout())))),
            active: ActiveLogs::new(),
            clock: Arc::new(SystemClock),
            use_locks: true,
        }
    }

    /// Delay between SIGTERM and SIGKILL when terminating a run.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// How long to keep reading output after the child exited.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_relay(mut self, relay: impl Write + Send + 'static) -> Self {
        self.relay = Some(Arc::new(Mutex::new(Box::new(relay))));
        self
    }

    pub fn with_shared_relay(mut self, relay: Relay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn without_relay(mut self) -> Self {
        self.relay = None;
        self
    }

    pub fn with_active_logs(mut self, active: ActiveLogs) -> Self {
        self.active = active;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether to take the per-job lock file.
    pub fn with_locks(mut self, use_locks: bool) -> Self {
        self.use_locks = use_locks;
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.log_dir.join(".locks")
    }

    pub fn active_logs(&self) -> &ActiveLogs {
        &self.active
    }

    /// Execute one run of a command job.
    ///
    /// Spawn and log failures are recorded as a failed run. An error is only
    /// returned when the run could not start at all: the job has no command,
    /// or another process holds its lock.
    pub async fn run(
        &self,
        job: &ScheduledJob,
        trigger: Trigger,
        cancel: CancellationToken,
    ) -> Result<RunRecord, TaskError> {
        let command = job
            .command_line()
            .ok_or_else(|| TaskError::NotACommand(job.name.clone()))?;

        let _lock = if self.use_locks {
            Some(JobLock::acquire(&self.lock_dir(), &job.name)?)
        } else {
            None
        };

        let started = self.clock.now();
        let mut record = RunRecord::start(&job.name, trigger, started);

        let writer = match LogWriter::create(&self.log_dir, &job.name, started) {
            Ok(writer) => writer,
            Err(e) => {
                error!(job = %job.name, run_id = %record.run_id, "Failed to create run log: {}", e);
                self.finalize(&mut record, RunStatus::Failed, None, false);
                return Ok(record.with_message(e.to_string()));
            }
        };
        record.log_path = Some(writer.path().to_path_buf());
        let _active = self.active.register(writer.path());
        let sink: Sink = Arc::new(Mutex::new(writer));

        let header = LogHeader {
            job: job.name.clone(),
            run_id: record.run_id,
            trigger: record.trigger.to_string(),
            started,
            command: command.to_string(),
            cwd: job.working_dir.clone(),
        };
        if let Err(e) = sink.lock().write_header(&header) {
            error!(job = %job.name, run_id = %record.run_id, "Failed to write run log: {}", e);
            self.finalize(&mut record, RunStatus::Failed, None, false);
            return Ok(record.with_message(e.to_string()));
        }

        info!(
            job = %job.name,
            run_id = %record.run_id,
            trigger = %record.trigger,
            "Run started: {}",
            sink.lock().path().display()
        );

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&job.working_dir)
            .envs(&job.env)
            .env("CRONHANDS_JOB", &job.name)
            .env("CRONHANDS_RUN_ID", record.run_id.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let (mut child, pumps) = match spawn_with_output(cmd, &sink, self.relay.clone()) {
            Ok(spawned) => spawned,
            Err(source) => {
                let e = TaskError::Spawn {
                    job: job.name.clone(),
                    source,
                };
                error!(job = %job.name, run_id = %record.run_id, "{}", e);
                let _ = sink.lock().append(format!("{}\n", e).as_bytes());
                self.write_footer(&sink, &record, RunStatus::Failed, None, false, false);
                self.finalize(&mut record, RunStatus::Failed, None, false);
                return Ok(record.with_message(e.to_string()));
            }
        };

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = cancel.cancelled() => Ending::Cancelled,
            _ = sleep_or_pending(job.timeout()) => {
                Ending::TimedOut(job.timeout().unwrap_or_default())
            }
        };

        let (result, status, interrupted) = match ending {
            Ending::Exited(result) => (result, None, false),
            Ending::Cancelled => {
                warn!(job = %job.name, run_id = %record.run_id, "Run cancelled, terminating");
                (self.terminate(&mut child).await, Some(RunStatus::Crashed), true)
            }
            Ending::TimedOut(after) => {
                warn!(
                    job = %job.name,
                    run_id = %record.run_id,
                    "{}, terminating",
                    TaskError::TimedOut(after)
                );
                (self.terminate(&mut child).await, Some(RunStatus::TimedOut), false)
            }
        };

        self.drain(pumps).await;

        match result {
            Ok(exit) => {
                let outcome = ProcessOutcome::from(exit);
                let status = status.unwrap_or_else(|| outcome.status());
                let exit_code = Some(outcome.recorded_exit_code());
                let signaled = outcome.signal.is_some();

                self.write_footer(&sink, &record, status, exit_code, signaled, interrupted);
                self.finalize(&mut record, status, exit_code, signaled);

                match outcome.error() {
                    None => info!(
                        job = %job.name,
                        run_id = %record.run_id,
                        "Run finished: status={} exit_code=0",
                        status
                    ),
                    Some(e) => {
                        warn!(job = %job.name, run_id = %record.run_id, "Run finished: status={} ({})", status, e);
                        record = record.with_message(e.to_string());
                    }
                }
            }
            Err(e) => {
                error!(job = %job.name, run_id = %record.run_id, "Failed to wait for child: {}", e);
                let status = status.unwrap_or(RunStatus::Crashed);
                self.write_footer(&sink, &record, status, None, false, interrupted);
                self.finalize(&mut record, status, None, false);
                record = record.with_message(e.to_string());
            }
        }

        Ok(record)
    }

    /// SIGTERM the child's process group, then SIGKILL after the grace period.
    async fn terminate(&self, child: &mut Child) -> std::io::Result<ExitStatus> {
        if let Some(pid) = child.id() {
            signal_group(pid, GroupSignal::Terminate);
        }

        match tokio::time::timeout(self.kill_grace, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!("Child did not exit within {:?}, killing", self.kill_grace);
                if let Some(pid) = child.id() {
                    signal_group(pid, GroupSignal::Kill);
                }
                let _ = child.start_kill();
                child.wait().await
            }
        }
    }

    /// Wait for the output pumps to reach EOF. Descendants that outlive the
    /// child can keep the pipe open, so this is bounded.
    async fn drain(&self, pumps: Vec<JoinHandle<()>>) {
        for mut pump in pumps {
            if tokio::time::timeout(self.drain_timeout, &mut pump)
                .await
                .is_err()
            {
                warn!(
                    "Output still open {:?} after exit, detaching",
                    self.drain_timeout
                );
                pump.abort();
            }
        }
    }

    fn write_footer(
        &self,
        sink: &Sink,
        record: &RunRecord,
        status: RunStatus,
        exit_code: Option<i32>,
        signaled: bool,
        interrupted: bool,
    ) {
        let finished = self.clock.now();
        let footer = LogFooter {
            status,
            exit_code,
            signaled,
            finished,
            duration: (finished - record.started_at).to_std().unwrap_or_default(),
            interrupted,
        };
        if let Err(e) = sink.lock().write_footer(&footer) {
            warn!(job = %record.job, run_id = %record.run_id, "Failed to write log footer: {}", e);
        }
    }

    fn finalize(
        &self,
        record: &mut RunRecord,
        status: RunStatus,
        exit_code: Option<i32>,
        signaled: bool,
    ) {
        if let Err(e) = record.finish(status, exit_code, signaled, self.clock.now()) {
            debug!("{}", e);
        }
    }
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Copy everything from `reader` into the run log and the relay.
async fn pump<R>(mut reader: R, sink: Sink, relay: Option<Relay>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut log_failed = false;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Failed to read child output: {}", e);
                break;
            }
        };
        let chunk = &buf[..n];

        if let Err(e) = sink.lock().append(chunk) {
            if !log_failed {
                error!("{}", e);
                log_failed = true;
            }
        }
        if let Some(relay) = &relay {
            let mut out = relay.lock();
            let _ = out.write_all(chunk).and_then(|_| out.flush());
        }
    }
}

/// Spawn with stdout and stderr on one pipe, so the log holds a single
/// ordered stream.
#[cfg(unix)]
fn spawn_with_output(
    mut cmd: Command,
    sink: &Sink,
    relay: Option<Relay>,
) -> std::io::Result<(Child, Vec<JoinHandle<()>>)> {
    use std::os::fd::AsRawFd;

    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use tokio::net::unix::pipe;

    let (read_fd, write_fd) = nix::unistd::pipe()?;
    for fd in [&read_fd, &write_fd] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }

    cmd.stdout(Stdio::from(write_fd.try_clone()?))
        .stderr(Stdio::from(write_fd));
    let child = cmd.spawn()?;
    // the parent's copies of the write end must be closed to see EOF
    drop(cmd);

    let reader = pipe::Receiver::from_owned_fd(read_fd)?;
    let handle = tokio::spawn(pump(reader, sink.clone(), relay));
    Ok((child, vec![handle]))
}

#[cfg(not(unix))]
fn spawn_with_output(
    mut cmd: Command,
    sink: &Sink,
    relay: Option<Relay>,
) -> std::io::Result<(Child, Vec<JoinHandle<()>>)> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn()?;

    let mut pumps = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(tokio::spawn(pump(stdout, sink.clone(), relay.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(pump(stderr, sink.clone(), relay)));
    }
    Ok((child, pumps))
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    let sig = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(raw), sig) {
        debug!("killpg({}, {:?}) failed: {}", raw, sig, e);
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: GroupSignal) {}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
