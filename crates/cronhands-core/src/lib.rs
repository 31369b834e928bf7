//! # cronhands core
//!
//! Domain types shared by every cronhands crate:
//!
//! - [`ScheduledJob`]: a named recurring unit of work (cron schedule + action)
//! - [`RetentionPolicy`]: what a sweep job deletes and when
//! - [`RunRecord`]: one firing of a job, finalized exactly once
//! - [`Clock`]: injectable time source so scheduling logic is testable

mod clock;
mod error;
mod job;
mod run;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use job::{validate_job_name, JobAction, RetentionPolicy, ScheduledJob, RESERVED_JOB_NAME};
pub use run::{RunRecord, RunStatus, Trigger};
