//! Process supervisor: the container entrypoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cronhands_config::{Config, ConfigLoader, ConfigValidator};
use cronhands_core::SystemClock;
use cronhands_runner::{Relay, TaskRunner};
use cronhands_scheduler::{
    ActionExecutor, FileScheduleStore, ScheduleTable, Scheduler, SchedulerConfig, SchedulerHandle,
};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{DaemonError, SupervisorState};
use crate::pid::PidFile;
use crate::signal::{DaemonSignal, SignalHandler};

/// Extra time given to the scheduler task beyond its own shutdown timeout.
const ABORT_SLACK: Duration = Duration::from_secs(5);

/// Owns the scheduler for the lifetime of the process.
///
/// Start: PID file, config validation, schedule install (fatal on error),
/// scheduler task, then a wait on the shutdown token. SIGHUP reloads the job
/// table from the config file; a failed reload keeps the running table.
pub struct Supervisor {
    config_path: PathBuf,
    config: Config,
    signals: SignalHandler,
    state: Mutex<SupervisorState>,
    relay: Option<Relay>,
    os_signals: bool,
}

impl Supervisor {
    pub fn new(config_path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            config_path: config_path.into(),
            config,
            signals: SignalHandler::new(),
            state: Mutex::new(SupervisorState::Stopped),
            relay: None,
            os_signals: true,
        }
    }

    /// Send run output here instead of stdout.
    pub fn with_relay(mut self, relay: Relay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Whether to listen for SIGTERM/SIGINT/SIGHUP. Disable when driving the
    /// supervisor through [`signals`](Self::signals) only.
    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    pub fn signals(&self) -> &SignalHandler {
        &self.signals
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn transition(&self, to: SupervisorState) -> Result<(), DaemonError> {
        let mut state = self.state.lock();
        if !state.can_transition_to(to) {
            return Err(DaemonError::InvalidStateTransition { from: *state, to });
        }
        info!("Supervisor state: {} -> {}", *state, to);
        *state = to;
        Ok(())
    }

    /// Move to `Stopped` after a startup failure and hand the error back.
    fn abort(&self, err: DaemonError) -> DaemonError {
        error!("Supervisor startup failed: {}", err);
        let _ = self.transition(SupervisorState::Stopping);
        let _ = self.transition(SupervisorState::Stopped);
        err
    }

    fn build_runner(&self) -> TaskRunner {
        let runner = TaskRunner::new(&self.config.paths.log_dir)
            .with_kill_grace(self.config.daemon.kill_grace());
        match &self.relay {
            Some(relay) => runner.with_shared_relay(relay.clone()),
            None if !self.config.logging.relay => runner.without_relay(),
            None => runner,
        }
    }

    /// Run until shutdown is requested.
    pub async fn run(&self) -> Result<(), DaemonError> {
        self.transition(SupervisorState::InstallingSchedule)?;

        let mut pid_file = None;
        if self.config.daemon.pid_file {
            let mut pid = PidFile::new(self.config.pid_file());
            if let Err(e) = pid.try_acquire() {
                return Err(self.abort(e));
            }
            pid_file = Some(pid);
        }

        let validation = ConfigValidator::validate(&self.config);
        for warning in &validation.warnings {
            warn!("Config warning: {}", warning);
        }
        if !validation.is_valid() {
            let errors: Vec<String> = validation.errors.iter().map(|e| e.to_string()).collect();
            return Err(self.abort(DaemonError::InvalidConfig(errors.join("; "))));
        }

        let table = Arc::new(ScheduleTable::new(Arc::new(FileScheduleStore::new(
            self.config.schedule_file(),
        ))));
        let executor = ActionExecutor::new(Arc::new(self.build_runner()));
        let scheduler = Scheduler::new(
            table,
            Arc::new(executor),
            Arc::new(SystemClock),
            SchedulerConfig {
                max_sleep: self.config.daemon.max_sleep(),
                shutdown_timeout: self.config.daemon.shutdown_timeout(),
                ..SchedulerConfig::default()
            },
        );

        match scheduler.install(self.config.scheduled_jobs()).await {
            Ok(count) => info!(
                "Installed {} jobs into {}",
                count,
                self.config.schedule_file().display()
            ),
            Err(e) => return Err(self.abort(e.into())),
        }

        self.transition(SupervisorState::DaemonRunning)?;
        let handle = scheduler.handle();
        let scheduler_token = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(scheduler_token.clone()));

        if self.os_signals {
            if let Err(e) = self.signals.listen_os_signals() {
                scheduler_token.cancel();
                let _ = task.await;
                return Err(self.abort(e));
            }
        }

        let shutdown = self.signals.shutdown_token();
        let mut signals = self.signals.subscribe();
        self.transition(SupervisorState::SteadyState)?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                signal = signals.recv() => match signal {
                    Ok(DaemonSignal::Reload) => self.reload(&handle).await,
                    Ok(DaemonSignal::Shutdown) => {}
                    Err(RecvError::Lagged(n)) => warn!("Missed {} signals", n),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.transition(SupervisorState::Stopping)?;
        scheduler_token.cancel();
        let wait = self.config.daemon.shutdown_timeout() + ABORT_SLACK;
        match tokio::time::timeout(wait, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Scheduler task failed: {}", e),
            Err(_) => warn!("Scheduler did not stop within {:?}", wait),
        }

        if let Some(mut pid) = pid_file {
            if let Err(e) = pid.release() {
                warn!("{}", e);
            }
        }

        self.transition(SupervisorState::Stopped)?;
        info!("Supervisor stopped");
        Ok(())
    }

    /// Reload the job table from the config file. Path and daemon settings
    /// need a restart.
    async fn reload(&self, handle: &SchedulerHandle) {
        info!("Reloading jobs from {}", self.config_path.display());

        let config = match ConfigLoader::load(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!("Reload failed, keeping current schedule: {}", e);
                return;
            }
        };

        let validation = ConfigValidator::validate(&config);
        if !validation.is_valid() {
            for e in &validation.errors {
                error!("Reload rejected: {}", e);
            }
            return;
        }

        if let Err(e) = handle.reload(config.scheduled_jobs()).await {
            error!("Reload failed, keeping current schedule: {}", e);
        }
    }
}
