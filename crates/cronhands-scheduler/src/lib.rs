//! # cronhands scheduler
//!
//! Fires installed jobs at their cron times, at most one run per job at a
//! time.
//!
//! - [`CronSpec`]: five-field cron expressions evaluated in UTC
//! - [`ScheduleTable`]: the installed job table, swapped whole on reload
//! - [`ScheduleStore`]: persisted copy of the table for out-of-process readers
//! - [`Scheduler`] / [`SchedulerHandle`]: the firing loop and its control handle

mod cron_spec;
mod error;
mod executor;
mod handle;
mod history;
mod scheduler;
mod store;
mod table;

pub use cron_spec::CronSpec;
pub use error::{ScheduleInstallError, SchedulerError, StoreError};
pub use executor::{ActionExecutor, JobExecutor};
pub use handle::{JobState, SchedulerHandle};
pub use history::RunHistory;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::{FileScheduleStore, MemoryScheduleStore, ScheduleStore, StoredSchedule};
pub use table::{InstalledJob, ScheduleTable};
