//! Configuration validation.

use std::collections::HashSet;

use cronhands_core::validate_job_name;

use crate::schema::{Config, JobConfig};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Configuration validator.
///
/// Cron expressions are only checked for shape here; the scheduler parses
/// them fully when the table is installed.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_paths(config, &mut result);
        Self::validate_daemon(config, &mut result);
        Self::validate_jobs(config, &mut result);
        Self::validate_health(config, &mut result);

        result
    }

    fn validate_paths(config: &Config, result: &mut ValidationResult) {
        if config.paths.log_dir.as_os_str().is_empty() {
            result.add_error(ValidationError::new("paths.log_dir", "log_dir cannot be empty"));
        }
        if config.paths.state_dir.as_os_str().is_empty() {
            result.add_error(ValidationError::new(
                "paths.state_dir",
                "state_dir cannot be empty",
            ));
        }
    }

    fn validate_daemon(config: &Config, result: &mut ValidationResult) {
        if config.daemon.max_sleep_secs == 0 {
            result.add_error(ValidationError::new(
                "daemon.max_sleep_secs",
                "max_sleep_secs must be greater than 0",
            ));
        }
        if config.daemon.kill_grace_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "daemon.kill_grace_secs",
                "kill_grace_secs is 0, runs are killed without a chance to clean up",
            ));
        }
    }

    fn validate_jobs(config: &Config, result: &mut ValidationResult) {
        if config.jobs.is_empty() {
            result.add_warning(ValidationWarning::new("jobs", "No jobs configured"));
        }

        let mut seen = HashSet::new();
        for (i, job) in config.jobs.iter().enumerate() {
            let path = format!("jobs[{}]", i);

            if let Err(e) = validate_job_name(&job.name) {
                result.add_error(ValidationError::new(format!("{}.name", path), e.to_string()));
            }
            if !seen.insert(job.name.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.name", path),
                    format!("Duplicate job name '{}'", job.name),
                ));
            }

            let fields = job.schedule.split_whitespace().count();
            if fields != 5 && !job.schedule.trim_start().starts_with('@') {
                result.add_error(ValidationError::new(
                    format!("{}.schedule", path),
                    format!("Expected 5 cron fields, found {}", fields),
                ));
            }

            Self::validate_action(job, &path, result);

            if let Some(ref next) = job.on_success {
                if next == &job.name {
                    result.add_error(ValidationError::new(
                        format!("{}.on_success", path),
                        "A job cannot chain into itself",
                    ));
                } else if !config.jobs.iter().any(|j| &j.name == next) {
                    result.add_error(ValidationError::new(
                        format!("{}.on_success", path),
                        format!("Unknown job '{}'", next),
                    ));
                }
            }

            if job.timeout_secs == Some(0) {
                result.add_error(ValidationError::new(
                    format!("{}.timeout_secs", path),
                    "timeout_secs must be greater than 0",
                ));
            }
        }
    }

    fn validate_action(job: &JobConfig, path: &str, result: &mut ValidationResult) {
        match (&job.command, &job.sweep) {
            (Some(_), Some(_)) => result.add_error(ValidationError::new(
                path,
                "A job has either a command or a sweep table, not both",
            )),
            (None, None) => result.add_error(ValidationError::new(
                path,
                "A job needs a command or a sweep table",
            )),
            (Some(command), None) => {
                if command.trim().is_empty() {
                    result.add_error(ValidationError::new(
                        format!("{}.command", path),
                        "Command cannot be empty",
                    ));
                }
                if let Some(ref dir) = job.working_dir {
                    if !dir.exists() {
                        result.add_warning(ValidationWarning::new(
                            format!("{}.working_dir", path),
                            format!("Working directory does not exist: {:?}", dir),
                        ));
                    }
                }
            }
            (None, Some(sweep)) => {
                if sweep.max_age_days == 0 {
                    result.add_error(ValidationError::new(
                        format!("{}.sweep.max_age_days", path),
                        "max_age_days must be greater than 0",
                    ));
                }
                for pattern in &sweep.patterns {
                    if pattern.contains('/') {
                        result.add_error(ValidationError::new(
                            format!("{}.sweep.patterns", path),
                            format!("Pattern '{}' must not contain a path separator", pattern),
                        ));
                    }
                }
                if job.timeout_secs.is_some() {
                    result.add_warning(ValidationWarning::new(
                        format!("{}.timeout_secs", path),
                        "timeout_secs is ignored for sweep jobs",
                    ));
                }
            }
        }
    }

    fn validate_health(config: &Config, result: &mut ValidationResult) {
        match config.health_job() {
            Some(name) => {
                if !config.jobs.iter().any(|j| j.name == name) {
                    result.add_error(ValidationError::new(
                        "health.job",
                        format!("Unknown job '{}'", name),
                    ));
                }
            }
            None if !config.jobs.is_empty() => {
                result.add_warning(ValidationWarning::new(
                    "health.job",
                    "No command job to probe, the liveness probe only checks the daemon",
                ));
            }
            None => {}
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
