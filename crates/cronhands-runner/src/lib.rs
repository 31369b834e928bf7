//! # cronhands runner
//!
//! Executes one firing of a command job: spawns the child, streams its
//! combined output into a timestamped run log (and a relay stream), and
//! records the child's own exit status.

mod active;
mod error;
mod lock;
mod log_writer;
mod outcome;
mod runner;

pub use active::{ActiveLogGuard, ActiveLogs, RunGuard, RunningJobs};
pub use error::TaskError;
pub use lock::{is_process_running, JobLock};
pub use log_writer::{
    is_run_log_of, log_path, parse_footer, parse_header, LogFooter, LogHeader, LogWriter,
};
pub use outcome::ProcessOutcome;
pub use runner::{Relay, TaskRunner};
