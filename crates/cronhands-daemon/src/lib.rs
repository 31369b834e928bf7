//! # cronhands daemon
//!
//! The long-running side of cronhands.
//!
//! - [`Supervisor`]: container entrypoint. Installs the schedule, runs the
//!   scheduler until SIGTERM/SIGINT and reloads on SIGHUP
//! - [`PidFile`]: single-instance guard, its mtime marks supervisor start
//! - [`LivenessProbe`]: side-effect free health check over on-disk evidence

pub mod error;
pub mod health;
pub mod pid;
pub mod signal;
pub mod supervisor;

pub use error::{DaemonError, SupervisorState};
pub use health::{LivenessProbe, ProbeError, ProbeReport, ProbeStatus};
pub use pid::PidFile;
pub use signal::{DaemonSignal, SignalHandler};
pub use supervisor::Supervisor;
