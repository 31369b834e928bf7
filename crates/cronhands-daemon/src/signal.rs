//! OS signals to supervisor actions.
//!
//! SIGTERM and SIGINT cancel the shutdown token; SIGHUP is broadcast as a
//! reload request. Both can also be requested in-process, which is how the
//! tests drive the supervisor.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// SIGTERM, SIGINT.
    Shutdown,
    /// SIGHUP: re-read the job table from the config file.
    Reload,
}

#[derive(Clone)]
pub struct SignalHandler {
    events: broadcast::Sender<DaemonSignal>,
    shutdown: CancellationToken,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Receiver for every signal sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DaemonSignal> {
        self.events.subscribe()
    }

    /// Cancelled on the first shutdown request.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn send(&self, signal: DaemonSignal) {
        debug!("Supervisor signal: {:?}", signal);
        if signal == DaemonSignal::Shutdown {
            self.shutdown.cancel();
        }
        // no subscribers is fine
        let _ = self.events.send(signal);
    }

    pub fn request_shutdown(&self) {
        self.send(DaemonSignal::Shutdown);
    }

    pub fn request_reload(&self) {
        self.send(DaemonSignal::Reload);
    }

    /// Start forwarding SIGTERM, SIGINT and SIGHUP. Must be called inside a
    /// tokio runtime.
    #[cfg(unix)]
    pub fn listen_os_signals(&self) -> Result<(), DaemonError> {
        use tokio::signal::unix::{signal, SignalKind};

        for (name, kind, action) in [
            ("SIGTERM", SignalKind::terminate(), DaemonSignal::Shutdown),
            ("SIGINT", SignalKind::interrupt(), DaemonSignal::Shutdown),
            ("SIGHUP", SignalKind::hangup(), DaemonSignal::Reload),
        ] {
            let mut stream = signal(kind).map_err(|e| DaemonError::SignalSetup {
                signal: name,
                reason: e.to_string(),
            })?;
            let handler = self.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    info!("Received {}", name);
                    handler.send(action);
                }
            });
        }

        debug!("Listening for SIGTERM, SIGINT and SIGHUP");
        Ok(())
    }

    /// Ctrl+C is the only signal available here.
    #[cfg(not(unix))]
    pub fn listen_os_signals(&self) -> Result<(), DaemonError> {
        let handler = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C");
                handler.request_shutdown();
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_cancels_token_once_for_all_clones() {
        let handler = SignalHandler::new();
        let token = handler.shutdown_token();
        let clone = handler.clone();
        assert!(!clone.is_shutdown_requested());

        handler.request_shutdown();
        handler.request_shutdown();

        assert!(token.is_cancelled());
        assert!(clone.is_shutdown_requested());
    }

    #[test]
    fn test_reload_without_subscribers_does_not_cancel() {
        let handler = SignalHandler::default();
        handler.request_reload();
        assert!(!handler.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_reload() {
        let handler = SignalHandler::new();
        let mut first = handler.subscribe();
        let mut second = handler.subscribe();

        handler.request_reload();

        assert_eq!(first.recv().await.unwrap(), DaemonSignal::Reload);
        assert_eq!(second.recv().await.unwrap(), DaemonSignal::Reload);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sighup_becomes_reload() {
        let handler = SignalHandler::new();
        let mut rx = handler.subscribe();
        handler.listen_os_signals().unwrap();

        raise_sighup();
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, DaemonSignal::Reload);
        assert!(!handler.is_shutdown_requested());
    }

    #[cfg(unix)]
    fn raise_sighup() {
        std::process::Command::new("kill")
            .arg("-HUP")
            .arg(std::process::id().to_string())
            .status()
            .unwrap();
    }
}
