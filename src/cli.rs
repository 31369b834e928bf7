//! CLI definitions for cronhands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cronhands CLI.
#[derive(Parser)]
#[command(name = "cronhands")]
#[command(about = "Cron-scheduled job runner with run logs, retention sweeps and a liveness probe")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "CRONHANDS_CONFIG",
        default_value = "/etc/cronhands/cronhands.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Install the schedule and run the scheduler in the foreground
    Run,

    /// Execute one job now and exit with its exit code
    RunOnce {
        /// Job name
        job: String,
    },

    /// Run every sweep job (or the given one) once and print the report
    Sweep {
        /// Sweep job name
        job: Option<String>,
    },

    /// Liveness probe: exit 0 when healthy, 1 otherwise
    Health {
        /// Give up and report unhealthy after this many seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print installed jobs with their next firings
    Schedule {
        /// Number of upcoming firings per job
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },

    /// Print recent runs parsed from run logs
    Status {
        /// Only this job
        job: Option<String>,

        /// Runs per job
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },

    /// Load and validate the configuration and schedule
    Validate,
}
