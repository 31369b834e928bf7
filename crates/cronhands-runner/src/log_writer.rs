//! Run log files.
//!
//! One file per firing, named `<job>_<YYYYMMDD>_<HHMMSS>.log`. The file
//! starts with a header line, holds the child's combined output verbatim, and
//! ends with a footer line carrying the outcome:
//!
//! ```text
//! [cronhands] start job=scraper run_id=... trigger=schedule started=2024-01-15T08:00:00.000Z
//! [cronhands] cwd=/app command=python scraper.py
//! ...scrape output...
//! [cronhands] end status=success exit_code=0 signaled=false finished=... duration_ms=2003
//! ```

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use cronhands_core::RunStatus;
use tracing::debug;
use uuid::Uuid;

use crate::error::TaskError;

const MARKER: &str = "[cronhands]";
const MAX_COLLISIONS: u32 = 1000;
const FOOTER_SCAN_BYTES: u64 = 4096;

/// Path of the log file for a run of `job` started at `started_at`.
pub fn log_path(dir: &Path, job: &str, started_at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("{}_{}.log", job, started_at.format("%Y%m%d_%H%M%S")))
}

/// Whether `file_name` is a run log of `job`, as produced by [`log_path`]
/// with an optional collision suffix. `scraper_daily_20240115_080000.log`
/// belongs to `scraper_daily`, not to `scraper`.
pub fn is_run_log_of(file_name: &str, job: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(job)
        .and_then(|r| r.strip_prefix('_'))
        .and_then(|r| r.strip_suffix(".log"))
    else {
        return false;
    };

    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    let mut parts = rest.split('_');
    let (Some(date), Some(time)) = (parts.next(), parts.next()) else {
        return false;
    };
    if !digits(date, 8) || !digits(time, 6) {
        return false;
    }
    match (parts.next(), parts.next()) {
        (None, _) => true,
        (Some(n), None) => !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()),
        _ => false,
    }
}

fn suffixed(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}_{}.log", stem, n))
}

/// First line of a run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHeader {
    pub job: String,
    pub run_id: Uuid,
    pub trigger: String,
    pub started: DateTime<Utc>,
    pub command: String,
    pub cwd: PathBuf,
}

/// Last line of a run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFooter {
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub signaled: bool,
    pub finished: DateTime<Utc>,
    pub duration: Duration,
    /// The run was cancelled before the child finished on its own.
    pub interrupted: bool,
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Append-only writer for one run log.
#[derive(Debug)]
pub struct LogWriter {
    path: PathBuf,
    file: File,
    bytes: u64,
    at_line_start: bool,
}

impl LogWriter {
    /// Create a new log file for the run. Never reuses an existing file:
    /// a same-second collision gets a `_1`, `_2`, ... suffix.
    pub fn create(dir: &Path, job: &str, started_at: DateTime<Utc>) -> Result<Self, TaskError> {
        let base = log_path(dir, job, started_at);
        fs::create_dir_all(dir).map_err(|source| TaskError::Log {
            path: base.clone(),
            source,
        })?;

        for n in 0..MAX_COLLISIONS {
            let path = if n == 0 { base.clone() } else { suffixed(&base, n) };
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    debug!("Created run log: {}", path.display());
                    return Ok(Self {
                        path,
                        file,
                        bytes: 0,
                        at_line_start: true,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(TaskError::Log { path, source }),
            }
        }

        Err(TaskError::Log {
            path: base,
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "too many runs started in the same second",
            ),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of child output appended so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn write_header(&mut self, header: &LogHeader) -> Result<(), TaskError> {
        let line = format!(
            "{MARKER} start job={} run_id={} trigger={} started={}\n{MARKER} cwd={} command={}\n",
            header.job,
            header.run_id,
            header.trigger,
            timestamp(header.started),
            header.cwd.display(),
            header.command,
        );
        self.write_raw(line.as_bytes())
    }

    /// Append a chunk of child output and flush it.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), TaskError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.write_raw(chunk)?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    pub fn write_footer(&mut self, footer: &LogFooter) -> Result<(), TaskError> {
        let mut line = String::new();
        if !self.at_line_start {
            line.push('\n');
        }
        line.push_str(&format!(
            "{MARKER} end status={} exit_code={} signaled={} finished={} duration_ms={}",
            footer.status,
            footer
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string()),
            footer.signaled,
            timestamp(footer.finished),
            footer.duration.as_millis(),
        ));
        if footer.interrupted {
            line.push_str(" interrupted=true");
        }
        line.push('\n');
        self.write_raw(line.as_bytes())?;
        self.file.sync_all().map_err(|source| TaskError::Log {
            path: self.path.clone(),
            source,
        })
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TaskError> {
        self.file
            .write_all(bytes)
            .and_then(|_| self.file.flush())
            .map_err(|source| TaskError::Log {
                path: self.path.clone(),
                source,
            })?;
        if let Some(last) = bytes.last() {
            self.at_line_start = *last == b'\n';
        }
        Ok(())
    }
}

fn fields<'a>(line: &'a str, prefix: &str) -> Option<HashMap<&'a str, &'a str>> {
    let rest = line.strip_prefix(prefix)?;
    Some(
        rest.split_whitespace()
            .filter_map(|token| token.split_once('='))
            .collect(),
    )
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn read_error(path: &Path) -> impl FnOnce(std::io::Error) -> TaskError + '_ {
    move |source| TaskError::Log {
        path: path.to_path_buf(),
        source,
    }
}

/// Read the header of a run log. `None` if the file does not start with one.
pub fn parse_header(path: &Path) -> Result<Option<LogHeader>, TaskError> {
    let file = File::open(path).map_err(read_error(path))?;
    let mut lines = BufReader::new(file).lines();

    let Some(first) = lines.next().transpose().map_err(read_error(path))? else {
        return Ok(None);
    };
    let Some(map) = fields(&first, &format!("{MARKER} start ")) else {
        return Ok(None);
    };

    let second = lines.next().transpose().map_err(read_error(path))?;
    let (cwd, command) = second
        .as_deref()
        .and_then(|l| l.strip_prefix(&format!("{MARKER} cwd=")))
        .and_then(|rest| rest.split_once(" command="))
        .map(|(cwd, command)| (PathBuf::from(cwd), command.to_string()))
        .unwrap_or_default();

    let header = (|| {
        Some(LogHeader {
            job: map.get("job")?.to_string(),
            run_id: map.get("run_id")?.parse().ok()?,
            trigger: map.get("trigger")?.to_string(),
            started: parse_time(map.get("started")?)?,
            command,
            cwd,
        })
    })();
    Ok(header)
}

/// Read the outcome of a run from the footer of its log.
///
/// Only the tail of the file is inspected. `None` means the run is still in
/// progress or ended without writing a footer.
pub fn parse_footer(path: &Path) -> Result<Option<LogFooter>, TaskError> {
    let mut file = File::open(path).map_err(read_error(path))?;
    let len = file.metadata().map_err(read_error(path))?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(FOOTER_SCAN_BYTES)))
        .map_err(read_error(path))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail).map_err(read_error(path))?;
    let tail = String::from_utf8_lossy(&tail);

    let prefix = format!("{MARKER} end ");
    let Some(map) = tail
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .and_then(|l| fields(l, &prefix))
    else {
        return Ok(None);
    };

    let footer = (|| {
        Some(LogFooter {
            status: map.get("status")?.parse().ok()?,
            exit_code: match *map.get("exit_code")? {
                "none" => None,
                code => Some(code.parse().ok()?),
            },
            signaled: map.get("signaled")?.parse().ok()?,
            finished: parse_time(map.get("finished")?)?,
            duration: Duration::from_millis(map.get("duration_ms")?.parse().ok()?),
            interrupted: map.get("interrupted").is_some_and(|v| *v == "true"),
        })
    })();
    Ok(footer)
}

#[cfg(test)]
#[path = "log_writer_tests.rs"]
mod tests;
